// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/mask.rs - 实例掩码重建
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

use crate::{frame::FrameGeometry, model::Candidate, tensor::PrototypeTensor};

/// 与检测框等大的掩码，逐像素保存 sigmoid 激活值，行优先
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl Mask {
  pub fn new(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
    if data.len() != width as usize * height as usize {
      return None;
    }
    Some(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn get(&self, x: u32, y: u32) -> Option<f32> {
    if x >= self.width || y >= self.height {
      return None;
    }
    Some(self.data[y as usize * self.width as usize + x as usize])
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 用掩码系数对原型做线性组合并取 sigmoid，得到 `原型高 x 原型宽` 的完整掩码
pub fn full_mask(coeffs: &[f32], proto: &PrototypeTensor) -> Vec<f32> {
  debug_assert_eq!(coeffs.len(), proto.channels());
  let (height, width) = (proto.height(), proto.width());

  let mut sums = vec![0.0f32; height * width];
  for (c, &coeff) in coeffs.iter().enumerate().take(proto.channels()) {
    for h in 0..height {
      for w in 0..width {
        sums[h * width + w] += coeff * proto.at(c, h, w);
      }
    }
  }

  sums.into_iter().map(sigmoid).collect()
}

/// 把原图坐标的框映射到掩码坐标系：下界向下取整，上界向上取整
fn mask_region(bbox: &[f32; 4], geometry: &FrameGeometry, proto_w: usize, proto_h: usize) -> [i64; 4] {
  let (extent_w, extent_h) = geometry.frame_extent();
  let (pw, ph) = (proto_w as f32, proto_h as f32);
  [
    (bbox[0] / extent_w * pw).floor() as i64,
    (bbox[1] / extent_h * ph).floor() as i64,
    (bbox[2] / extent_w * pw).ceil() as i64,
    (bbox[3] / extent_h * ph).ceil() as i64,
  ]
}

/// 裁剪区域，越界的索引夹到 `[0, 尺寸)` 内
fn crop_clamped(full: &[f32], width: usize, height: usize, region: [i64; 4]) -> (Vec<f32>, usize, usize) {
  let [x1, y1, x2, y2] = region;
  let crop_w = (x2 - x1).max(1) as usize;
  let crop_h = (y2 - y1).max(1) as usize;

  let mut cropped = Vec::with_capacity(crop_w * crop_h);
  for dy in 0..crop_h as i64 {
    let y = (y1 + dy).clamp(0, height as i64 - 1) as usize;
    for dx in 0..crop_w as i64 {
      let x = (x1 + dx).clamp(0, width as i64 - 1) as usize;
      cropped.push(full[y * width + x]);
    }
  }
  (cropped, crop_w, crop_h)
}

/// 双线性插值缩放，源坐标 `x / to_w * from_w`，高边索引夹到 `dim - 1`
pub fn resize_bilinear(
  src: &[f32],
  from_w: usize,
  from_h: usize,
  to_w: usize,
  to_h: usize,
) -> Vec<f32> {
  let mut output = vec![0.0f32; to_w * to_h];
  if from_w == 0 || from_h == 0 {
    return output;
  }

  for y in 0..to_h {
    let src_y = y as f32 / to_h as f32 * from_h as f32;
    let y1 = (src_y.floor() as usize).min(from_h - 1);
    let y2 = (y1 + 1).min(from_h - 1);
    let fy = src_y - y1 as f32;

    for x in 0..to_w {
      let src_x = x as f32 / to_w as f32 * from_w as f32;
      let x1 = (src_x.floor() as usize).min(from_w - 1);
      let x2 = (x1 + 1).min(from_w - 1);
      let fx = src_x - x1 as f32;

      output[y * to_w + x] = src[y1 * from_w + x1] * (1.0 - fx) * (1.0 - fy)
        + src[y1 * from_w + x2] * fx * (1.0 - fy)
        + src[y2 * from_w + x1] * (1.0 - fx) * fy
        + src[y2 * from_w + x2] * fx * fy;
    }
  }
  output
}

/// 重建候选框的实例掩码，尺寸为框的四舍五入像素宽高
pub fn reconstruct_mask(candidate: &Candidate, proto: &PrototypeTensor, geometry: &FrameGeometry) -> Mask {
  let (proto_w, proto_h) = (proto.width(), proto.height());
  let full = full_mask(&candidate.mask_coeffs, proto);

  let region = mask_region(&candidate.bbox, geometry, proto_w, proto_h);
  let (cropped, crop_w, crop_h) = crop_clamped(&full, proto_w, proto_h, region);

  let (width, height) = candidate.pixel_size();
  let data = resize_bilinear(&cropped, crop_w, crop_h, width as usize, height as usize);
  Mask {
    width,
    height,
    data: data.into_boxed_slice(),
  }
}
