// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 分割结果可视化与记录
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  labels::LabelSet,
  model::{DetectItem, DetectResult},
};

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_COLOR: [u8; 3] = [0, 0, 0];
// 激活值高于该阈值的像素才着色
const MASK_THRESHOLD: f32 = 0.7;
const MASK_OPACITY: f32 = 0.5;
const PALETTE_SATURATION: f32 = 0.8;
const PALETTE_LIGHTNESS: f32 = 0.6;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
  #[error("未知的标签集: {0}")]
  UnknownLabels(String),
}

/// HSL 转 RGB，`h` 取 [0, 1)
fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Rgb<u8> {
  if s == 0.0 {
    let v = (l * 255.0).round() as u8;
    return Rgb([v, v, v]);
  }

  let hue_to_rgb = |p: f32, q: f32, mut t: f32| {
    if t < 0.0 {
      t += 1.0;
    }
    if t > 1.0 {
      t -= 1.0;
    }
    if t < 1.0 / 6.0 {
      p + (q - p) * 6.0 * t
    } else if t < 0.5 {
      q
    } else if t < 2.0 / 3.0 {
      p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
      p
    }
  };

  let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
  let p = 2.0 * l - q;
  let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

  Rgb([
    to_u8(hue_to_rgb(p, q, h + 1.0 / 3.0)),
    to_u8(hue_to_rgb(p, q, h)),
    to_u8(hue_to_rgb(p, q, h - 1.0 / 3.0)),
  ])
}

/// 色相均匀分布的 `count` 种颜色
pub fn generate_palette(count: usize) -> Vec<Rgb<u8>> {
  let count = count.max(1);
  (0..count)
    .map(|i| {
      hsl_to_rgb(
        i as f32 / count as f32,
        PALETTE_SATURATION,
        PALETTE_LIGHTNESS,
      )
    })
    .collect()
}

pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontArc, DrawError> {
  let path = path.as_ref();
  debug!("加载字体: {}", path.display());
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

/// 掩码叠加、边框与居中标签
pub struct Draw {
  labels: LabelSet,
  palette: Vec<Rgb<u8>>,
  font: Option<FontArc>,
  font_scale: PxScale,
  label_color: Rgb<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(LabelSet::default())
  }
}

impl Draw {
  pub fn new(labels: LabelSet) -> Self {
    let palette = generate_palette(labels.len());
    Self {
      labels,
      palette,
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      label_color: Rgb(LABEL_COLOR),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, size: f32) -> Self {
    self.font_scale = PxScale::from(size);
    self
  }

  /// 从输出 URL 的查询参数读取 `labels=tier|coco` 与 `font=/path/to/font.ttf`
  pub fn from_query(url: &Url) -> Result<Self, DrawError> {
    let mut draw = Draw::default();
    for (key, value) in url.query_pairs() {
      match &*key {
        "labels" => {
          let labels =
            LabelSet::builtin(&value).ok_or_else(|| DrawError::UnknownLabels(value.to_string()))?;
          let font = draw.font.take();
          draw = Draw::new(labels);
          draw.font = font;
        }
        "font" => draw.font = Some(load_font(&*value)?),
        _ => {}
      }
    }
    if draw.font.is_none() {
      warn!("未指定字体，跳过标签绘制");
    }
    Ok(draw)
  }

  pub fn color_of(&self, item: &DetectItem) -> Rgb<u8> {
    let index = self
      .labels
      .palette_index(&item.label)
      .unwrap_or(item.class_id as usize);
    self.palette[index % self.palette.len()]
  }

  /// 掩码左上角与检测框左上角对齐
  fn blend_mask(&self, image: &mut RgbImage, item: &DetectItem, color: Rgb<u8>) {
    let Some(mask) = item.mask.as_ref() else {
      return;
    };
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let (left, top) = (item.bbox[0].round() as i64, item.bbox[1].round() as i64);

    for my in 0..mask.height() {
      let y = top + my as i64;
      if y < 0 || y >= img_h {
        continue;
      }
      for mx in 0..mask.width() {
        let x = left + mx as i64;
        if x < 0 || x >= img_w {
          continue;
        }
        let Some(value) = mask.get(mx, my) else {
          continue;
        };
        if value <= MASK_THRESHOLD {
          continue;
        }
        let alpha = value * MASK_OPACITY;
        let pixel = image.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in pixel.0.iter_mut().zip(color.0) {
          *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
        }
      }
    }
  }

  fn draw_bbox(&self, image: &mut RgbImage, item: &DetectItem, color: Rgb<u8>) {
    let x_min = item.bbox[0].floor().max(0.0) as i32;
    let y_min = item.bbox[1].floor().max(0.0) as i32;
    let x_max = (item.bbox[2].ceil() as i32).min(image.width() as i32 - 1);
    let y_max = (item.bbox[3].ceil() as i32).min(image.height() as i32 - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let rect = Rect::at(x_min, y_min).of_size((x_max - x_min) as u32, (y_max - y_min) as u32);
    draw_hollow_rect_mut(image, rect, color);
  }

  /// 标签文字居中于检测框
  fn draw_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let Some(font) = self.font.as_ref() else {
      return;
    };
    let (text_w, text_h) = text_size(self.font_scale, font, &item.label);
    let center_x = (item.bbox[0] + item.bbox[2]) / 2.0;
    let center_y = (item.bbox[1] + item.bbox[3]) / 2.0;
    let x = (center_x - text_w as f32 / 2.0).round() as i32;
    let y = (center_y - text_h as f32 / 2.0).round() as i32;
    draw_text_mut(
      image,
      self.label_color,
      x,
      y,
      self.font_scale,
      font,
      &item.label,
    );
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      let color = self.color_of(item);
      self.blend_mask(image, item, color);
      self.draw_bbox(image, item, color);
      self.draw_label(image, item);
    }
  }

  pub fn draw_detection(&self, frame: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = frame.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  Text,
  Json,
}

pub struct Record {
  pub format: RecordFormat,
}

impl Record {
  /// 文本格式每行一个目标：`label, score, x1, y1, x2, y2`
  pub fn to_text(result: &DetectResult) -> String {
    result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          item.label, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn to_json(result: &DetectResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&result.items)
  }

  /// 写到与图片同名、扩展名为 txt 或 json 的文件
  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    match self.format {
      RecordFormat::Text => std::fs::write(path.with_extension("txt"), Self::to_text(result)),
      RecordFormat::Json => {
        let text = Self::to_json(result)?;
        std::fs::write(path.with_extension("json"), text)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Mask;

  fn item(label: &str, class_id: u32, bbox: [f32; 4], mask: Option<Mask>) -> DetectItem {
    DetectItem {
      class_id,
      label: label.to_string(),
      score: 0.9,
      bbox,
      mask,
    }
  }

  #[test]
  fn palette_is_evenly_spaced() {
    let palette = generate_palette(32);
    assert_eq!(palette.len(), 32);
    // 色相 0：红色分量最大
    assert_eq!(palette[0], Rgb([235, 71, 71]));
    assert_eq!(generate_palette(0).len(), 1);
  }

  #[test]
  fn color_follows_label_position() {
    let draw = Draw::default();
    let palette = generate_palette(32);
    assert_eq!(draw.color_of(&item("T48", 0, [0.0; 4], None)), palette[31]);
    // 未知标签退回到类别编号
    assert_eq!(draw.color_of(&item("X", 33, [0.0; 4], None)), palette[1]);
  }

  #[test]
  fn mask_blends_only_above_threshold() {
    let draw = Draw::default();
    let mask = Mask::new(2, 1, vec![1.0, 0.7]).unwrap();
    let detection = item("T11", 0, [1.0, 1.0, 3.0, 2.0], Some(mask));
    let color = draw.color_of(&detection);

    let mut image = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
    draw.blend_mask(&mut image, &detection, color);

    let expected = |c: u8| (255.0 * 0.5 + c as f32 * 0.5).round() as u8;
    let blended = image.get_pixel(1, 1);
    assert_eq!(blended.0, color.0.map(expected));
    assert_eq!(image.get_pixel(2, 1).0, [255, 255, 255]);
    assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
  }

  #[test]
  fn draws_box_outline_without_font() {
    let draw = Draw::default();
    let frame = RgbImage::new(10, 10);
    let result = DetectResult {
      items: vec![item("T11", 0, [2.0, 2.0, 6.0, 6.0], None)].into_boxed_slice(),
    };
    let image = draw.draw_detection(&frame, &result);
    let color = generate_palette(32)[0];
    assert_eq!(*image.get_pixel(2, 2), color);
    assert_eq!(*image.get_pixel(4, 4), Rgb([0, 0, 0]));
  }

  #[test]
  fn from_query_rejects_unknown_labels() {
    let url = Url::parse("image:///tmp/out.png?labels=voc").unwrap();
    assert!(matches!(
      Draw::from_query(&url),
      Err(DrawError::UnknownLabels(_))
    ));
    let url = Url::parse("image:///tmp/out.png?font=/definitely/not/here.ttf").unwrap();
    assert!(matches!(Draw::from_query(&url), Err(DrawError::IoError(_))));
  }

  #[test]
  fn record_text_and_json() {
    let result = DetectResult {
      items: vec![item("cat", 15, [1.0, 2.0, 3.0, 4.0], Mask::new(1, 1, vec![1.0]))]
        .into_boxed_slice(),
    };
    assert_eq!(
      Record::to_text(&result),
      "cat, 0.9000, 1.0000, 2.0000, 3.0000, 4.0000"
    );

    let json: serde_json::Value = serde_json::from_str(&Record::to_json(&result).unwrap()).unwrap();
    assert_eq!(json[0]["label"], "cat");
    assert_eq!(json[0]["class_id"], 15);
    assert!(json[0].get("mask").is_none());
  }
}
