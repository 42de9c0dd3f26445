// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NCHW 帧定义
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

use crate::{config::BoxMapping, model::SegmentError};

const RGB_CHANNELS: usize = 3;

pub trait AsNchwFrame {
  fn as_nchw(&self) -> &[f32];
}

/// 归一化到 [0, 1] 的 `1x3xSxS` 浮点输入帧
#[derive(Debug, Clone, PartialEq)]
pub struct LetterboxFrame<const S: u32> {
  data: Box<[f32]>,
}

impl<const S: u32> LetterboxFrame<S> {
  pub const LEN: usize = RGB_CHANNELS * S as usize * S as usize;

  pub fn size(&self) -> usize {
    S as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 通道 `c`、像素 `(h, w)` 的值
  pub fn at(&self, c: usize, h: usize, w: usize) -> f32 {
    let s = S as usize;
    self.data[c * s * s + h * s + w]
  }
}

impl<const S: u32> TryFrom<Vec<f32>> for LetterboxFrame<S> {
  type Error = SegmentError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(SegmentError::malformed("input", Self::LEN, data.len()));
    }
    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const S: u32> Default for LetterboxFrame<S> {
  fn default() -> Self {
    Self {
      data: vec![0.0; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const S: u32> AsMut<[f32]> for LetterboxFrame<S> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl<const S: u32> AsNchwFrame for LetterboxFrame<S> {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}

/// 预处理时记录的几何信息，用于把网络坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
  pub source_width: u32,
  pub source_height: u32,
  /// 右/下补边后的正方形边长，即 max(宽, 高)
  pub padded_size: u32,
  pub mapping: BoxMapping,
}

impl FrameGeometry {
  pub fn new(source_width: u32, source_height: u32) -> Self {
    Self {
      source_width,
      source_height,
      padded_size: source_width.max(source_height),
      mapping: BoxMapping::default(),
    }
  }

  pub fn with_mapping(mut self, mapping: BoxMapping) -> Self {
    self.mapping = mapping;
    self
  }

  /// 网络输入的 [0, input_size) 区间对应的原图跨度 (宽, 高)
  pub fn frame_extent(&self) -> (f32, f32) {
    match self.mapping {
      BoxMapping::Letterbox => (self.padded_size as f32, self.padded_size as f32),
      BoxMapping::Stretch => (self.source_width as f32, self.source_height as f32),
    }
  }

  pub fn pad_right(&self) -> u32 {
    self.padded_size - self.source_width
  }

  pub fn pad_bottom(&self) -> u32 {
    self.padded_size - self.source_height
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_rejects_wrong_length() {
    let err = LetterboxFrame::<4>::try_from(vec![0.0; 10]).unwrap_err();
    assert_eq!(err, SegmentError::malformed("input", 48, 10));
    assert!(LetterboxFrame::<4>::try_from(vec![0.0; 48]).is_ok());
  }

  #[test]
  fn frame_indexing_is_nchw() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let frame = LetterboxFrame::<2>::try_from(data).unwrap();
    assert_eq!(frame.at(1, 0, 1), 5.0);
    assert_eq!(frame.at(2, 1, 1), 11.0);
    assert_eq!((frame.channels(), frame.size()), (3, 2));
  }

  #[test]
  fn geometry_extent() {
    let geometry = FrameGeometry::new(1280, 720);
    assert_eq!(geometry.padded_size, 1280);
    assert_eq!(geometry.pad_right(), 0);
    assert_eq!(geometry.pad_bottom(), 560);
    assert_eq!(geometry.frame_extent(), (1280.0, 1280.0));
    let stretched = geometry.with_mapping(BoxMapping::Stretch);
    assert_eq!(stretched.frame_extent(), (1280.0, 720.0));
  }
}
