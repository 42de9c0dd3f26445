// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 检测张量解码
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

use tracing::debug;

use crate::{frame::FrameGeometry, tensor::DetectionTensor};

/// 解码后的候选框，坐标为原图像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub class_id: u32,
  pub confidence: f32,
  pub mask_coeffs: Box<[f32]>,
}

impl Candidate {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  /// 掩码输出的像素尺寸 (宽, 高)
  pub fn pixel_size(&self) -> (u32, u32) {
    (
      self.width().round().max(0.0) as u32,
      self.height().round().max(0.0) as u32,
    )
  }

  /// 裁剪到原图范围内；裁剪后宽或高不为正的框视为退化框，返回 None。
  /// 不足一个像素的框仍然保留，其掩码可能为空
  pub fn clip_to(mut self, width: u32, height: u32) -> Option<Self> {
    let (w, h) = (width as f32, height as f32);
    self.bbox = [
      self.bbox[0].clamp(0.0, w),
      self.bbox[1].clamp(0.0, h),
      self.bbox[2].clamp(0.0, w),
      self.bbox[3].clamp(0.0, h),
    ];

    if !(self.width() > 0.0 && self.height() > 0.0) {
      return None;
    }
    Some(self)
  }
}

/// 逐锚点扫描检测张量
///
/// 每个锚点取分数最高的类别（相同分数取编号最小者），分数低于阈值的锚点被丢弃。
/// 框中心与宽高位于网络输入坐标系 `[0, input_size)`，按 `geometry` 映射回原图。
pub fn decode(
  raw: &DetectionTensor,
  geometry: &FrameGeometry,
  input_size: u32,
  confidence_threshold: f32,
) -> Vec<Candidate> {
  let (extent_w, extent_h) = geometry.frame_extent();
  let input_size = input_size as f32;
  let class_offset = raw.class_offset();
  let mask_offset = raw.mask_offset();

  let mut candidates = Vec::new();
  for anchor in 0..raw.num_anchors() {
    let (class_id, confidence) = {
      // NaN 分数不参与比较
      let mut max_score = f32::NEG_INFINITY;
      let mut cls_idx = 0usize;
      for c in 0..raw.num_classes() {
        let score = raw.at(class_offset + c, anchor);
        if score > max_score {
          max_score = score;
          cls_idx = c;
        }
      }
      (cls_idx as u32, max_score)
    };

    if confidence.is_nan() || confidence < confidence_threshold {
      continue;
    }

    let xc = raw.at(0, anchor);
    let yc = raw.at(1, anchor);
    let w = raw.at(2, anchor);
    let h = raw.at(3, anchor);

    let bbox = [
      (xc - w / 2.0) / input_size * extent_w,
      (yc - h / 2.0) / input_size * extent_h,
      (xc + w / 2.0) / input_size * extent_w,
      (yc + h / 2.0) / input_size * extent_h,
    ];

    let mask_coeffs = (0..raw.num_mask_coeffs())
      .map(|i| raw.at(mask_offset + i, anchor))
      .collect();

    candidates.push(Candidate {
      bbox,
      class_id,
      confidence,
      mask_coeffs,
    });
  }

  debug!(
    "解码 {} 个锚点, {} 个候选框高于阈值 {}",
    raw.num_anchors(),
    candidates.len(),
    confidence_threshold
  );
  candidates
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::{BoxMapping, SegConfig}, labels::LabelSet};
  use approx::assert_abs_diff_eq;

  /// 2 类、2 个掩码系数、若干锚点的小模型
  fn config(anchors: usize) -> SegConfig {
    let mut config = SegConfig::default()
      .with_labels(LabelSet::from_names(["a", "b"]))
      .with_anchors(anchors);
    config.num_mask_coeffs = 2;
    config
  }

  /// 按 [xc, yc, w, h, s0, s1, m0, m1] 写入一个锚点
  fn set_anchor(data: &mut [f32], anchors: usize, anchor: usize, values: [f32; 8]) {
    for (channel, value) in values.iter().enumerate() {
      data[channel * anchors + anchor] = *value;
    }
  }

  #[test]
  fn decodes_box_into_source_space() {
    let config = config(1);
    let mut data = vec![0.0; 8];
    set_anchor(&mut data, 1, 0, [320.0, 160.0, 64.0, 32.0, 0.1, 0.9, 0.25, -0.5]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();

    let geometry = FrameGeometry::new(1280, 1280);
    let candidates = decode(&tensor, &geometry, 640, 0.5);
    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.class_id, 1);
    assert_abs_diff_eq!(c.confidence, 0.9);
    assert_abs_diff_eq!(c.bbox[0], 576.0, epsilon = 1e-4);
    assert_abs_diff_eq!(c.bbox[1], 288.0, epsilon = 1e-4);
    assert_abs_diff_eq!(c.bbox[2], 704.0, epsilon = 1e-4);
    assert_abs_diff_eq!(c.bbox[3], 352.0, epsilon = 1e-4);
    assert_eq!(&*c.mask_coeffs, &[0.25, -0.5]);
  }

  #[test]
  fn letterbox_mapping_uses_padded_square() {
    let config = config(1);
    let mut data = vec![0.0; 8];
    set_anchor(&mut data, 1, 0, [320.0, 320.0, 640.0, 640.0, 0.8, 0.0, 0.0, 0.0]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();

    // 1000x500 的图补边到 1000x1000
    let geometry = FrameGeometry::new(1000, 500);
    let c = &decode(&tensor, &geometry, 640, 0.5)[0];
    assert_abs_diff_eq!(c.bbox[3], 1000.0, epsilon = 1e-3);

    let stretched = geometry.with_mapping(BoxMapping::Stretch);
    let c = &decode(&tensor, &stretched, 640, 0.5)[0];
    assert_abs_diff_eq!(c.bbox[2], 1000.0, epsilon = 1e-3);
    assert_abs_diff_eq!(c.bbox[3], 500.0, epsilon = 1e-3);
  }

  #[test]
  fn ties_resolve_to_lowest_class() {
    let config = config(1);
    let mut data = vec![0.0; 8];
    set_anchor(&mut data, 1, 0, [10.0, 10.0, 4.0, 4.0, 0.7, 0.7, 0.0, 0.0]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();
    let c = &decode(&tensor, &FrameGeometry::new(640, 640), 640, 0.5)[0];
    assert_eq!(c.class_id, 0);
  }

  #[test]
  fn threshold_is_inclusive() {
    let config = config(3);
    let mut data = vec![0.0; 8 * 3];
    set_anchor(&mut data, 3, 0, [10.0, 10.0, 4.0, 4.0, 0.5, 0.0, 0.0, 0.0]);
    set_anchor(&mut data, 3, 1, [10.0, 10.0, 4.0, 4.0, 0.0, 0.4999, 0.0, 0.0]);
    set_anchor(&mut data, 3, 2, [10.0, 10.0, 4.0, 4.0, f32::NAN, f32::NAN, 0.0, 0.0]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();
    let candidates = decode(&tensor, &FrameGeometry::new(640, 640), 640, 0.5);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].confidence, 0.5);
  }

  #[test]
  fn maskless_tensor_has_no_coefficients() {
    let config = config(1).with_masks(false);
    let data = vec![5.0, 5.0, 2.0, 2.0, 0.9, 0.1];
    let tensor = DetectionTensor::new(&data, &config).unwrap();
    let c = &decode(&tensor, &FrameGeometry::new(640, 640), 640, 0.2)[0];
    assert!(c.mask_coeffs.is_empty());
  }

  #[test]
  fn clip_drops_degenerate_boxes() {
    let candidate = Candidate {
      bbox: [-10.0, 5.0, 50.0, 30.0],
      class_id: 0,
      confidence: 0.9,
      mask_coeffs: Box::new([]),
    };
    let clipped = candidate.clone().clip_to(40, 40).unwrap();
    assert_eq!(clipped.bbox, [0.0, 5.0, 40.0, 30.0]);
    assert_eq!(clipped.pixel_size(), (40, 25));

    let outside = Candidate {
      bbox: [50.0, 5.0, 60.0, 30.0],
      ..candidate.clone()
    };
    assert!(outside.clip_to(40, 40).is_none());

    let inverted = Candidate {
      bbox: [20.0, 30.0, 10.0, 40.0],
      ..candidate.clone()
    };
    assert!(inverted.clip_to(40, 40).is_none());

    let flat = Candidate {
      bbox: [10.0, 10.0, 10.0, 20.0],
      ..candidate.clone()
    };
    assert!(flat.clip_to(40, 40).is_none());
  }

  #[test]
  fn subpixel_boxes_are_kept() {
    let sliver = Candidate {
      bbox: [10.0, 10.0, 10.2, 20.0],
      class_id: 0,
      confidence: 0.9,
      mask_coeffs: Box::new([]),
    };
    let clipped = sliver.clip_to(40, 40).unwrap();
    assert_eq!(clipped.pixel_size(), (0, 10));

    let config = config(1);
    let mut data = vec![0.0; 8];
    set_anchor(&mut data, 1, 0, [100.0, 100.0, 0.4, 20.0, 0.9, 0.0, 0.0, 0.0]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();
    let candidates = decode(&tensor, &FrameGeometry::new(640, 640), 640, 0.5);
    assert_eq!(candidates.len(), 1);
    assert!(candidates[0].clone().clip_to(640, 640).is_some());
  }

  #[test]
  fn nan_score_does_not_hide_other_classes() {
    let config = config(2);
    let mut data = vec![0.0; 8 * 2];
    set_anchor(&mut data, 2, 0, [10.0, 10.0, 4.0, 4.0, f32::NAN, 0.9, 0.0, 0.0]);
    set_anchor(&mut data, 2, 1, [10.0, 10.0, 4.0, 4.0, 0.8, f32::NAN, 0.0, 0.0]);
    let tensor = DetectionTensor::new(&data, &config).unwrap();
    let candidates = decode(&tensor, &FrameGeometry::new(640, 640), 640, 0.5);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].class_id, 1);
    assert_abs_diff_eq!(candidates[0].confidence, 0.9);
    assert_eq!(candidates[1].class_id, 0);
    assert_abs_diff_eq!(candidates[1].confidence, 0.8);
  }
}
