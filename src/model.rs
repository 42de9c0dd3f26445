// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug, PartialEq)]
pub enum SegmentError {
  #[error("图像无效: {0}")]
  InvalidImage(String),
  #[error("张量 {name} 形状不匹配: 期望 {expected} 个元素, 实际 {actual} 个")]
  MalformedTensor {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("张量 {name} 形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    name: &'static str,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("缺少张量: {0}")]
  MissingTensor(&'static str),
  #[error("图像缩放失败: {0}")]
  Resize(String),
  #[error("配置无效: {0}")]
  Config(#[from] ConfigError),
}

impl SegmentError {
  pub fn malformed(name: &'static str, expected: usize, actual: usize) -> Self {
    SegmentError::MalformedTensor {
      name,
      expected,
      actual,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
  #[serde(skip)]
  pub mask: Option<Mask>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

mod decode;
mod letterbox;
mod mask;
mod nms;
mod replay;
mod yolo_seg;

pub use self::decode::{Candidate, decode};
pub use self::letterbox::{area_resize, letterbox};
pub use self::mask::{Mask, full_mask, reconstruct_mask, resize_bilinear};
pub use self::nms::{BoxLike, iou, suppress, suppress_per_class};
pub use self::replay::{ReplayEngine, ReplayEngineError};
pub use self::yolo_seg::{InferenceEngine, YoloSeg, YoloSegBuilder, YoloSegError, postprocess};
