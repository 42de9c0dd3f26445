// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 推理输出张量
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

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{config::SegConfig, model::SegmentError};

pub const DETECTION_TENSOR_NAME: &str = "output0";
pub const PROTOTYPE_TENSOR_NAME: &str = "output1";

/// 检测张量 `[4 + 类别数 + 掩码系数数, 锚点数]`，按通道优先展开
#[derive(Debug, Clone, Copy)]
pub struct DetectionTensor<'a> {
  data: &'a [f32],
  num_classes: usize,
  num_mask_coeffs: usize,
  num_anchors: usize,
}

impl<'a> DetectionTensor<'a> {
  pub fn new(data: &'a [f32], config: &SegConfig) -> Result<Self, SegmentError> {
    let expected = config.detection_channels() * config.num_anchors;
    if data.len() != expected {
      error!(
        "检测张量大小不匹配: 期望 {} ({} x {}), 实际 {}",
        expected,
        config.detection_channels(),
        config.num_anchors,
        data.len()
      );
      return Err(SegmentError::malformed(
        DETECTION_TENSOR_NAME,
        expected,
        data.len(),
      ));
    }

    Ok(Self {
      data,
      num_classes: config.num_classes,
      num_mask_coeffs: config.mask_channels(),
      num_anchors: config.num_anchors,
    })
  }

  #[inline]
  pub fn at(&self, channel: usize, anchor: usize) -> f32 {
    self.data[channel * self.num_anchors + anchor]
  }

  pub fn num_anchors(&self) -> usize {
    self.num_anchors
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn num_mask_coeffs(&self) -> usize {
    self.num_mask_coeffs
  }

  pub fn class_offset(&self) -> usize {
    4
  }

  pub fn mask_offset(&self) -> usize {
    4 + self.num_classes
  }
}

/// 掩码原型张量 `[掩码系数数, 原型高, 原型宽]`
#[derive(Debug, Clone, Copy)]
pub struct PrototypeTensor<'a> {
  data: &'a [f32],
  channels: usize,
  height: usize,
  width: usize,
}

impl<'a> PrototypeTensor<'a> {
  pub fn new(data: &'a [f32], config: &SegConfig) -> Result<Self, SegmentError> {
    Self::with_shape(
      data,
      config.num_mask_coeffs,
      config.proto_height,
      config.proto_width,
    )
  }

  pub fn with_shape(
    data: &'a [f32],
    channels: usize,
    height: usize,
    width: usize,
  ) -> Result<Self, SegmentError> {
    let expected = channels * height * width;
    if data.len() != expected {
      error!(
        "原型张量大小不匹配: 期望 {} ({} x {} x {}), 实际 {}",
        expected,
        channels,
        height,
        width,
        data.len()
      );
      return Err(SegmentError::malformed(
        PROTOTYPE_TENSOR_NAME,
        expected,
        data.len(),
      ));
    }

    Ok(Self {
      data,
      channels,
      height,
      width,
    })
  }

  #[inline]
  pub fn at(&self, channel: usize, h: usize, w: usize) -> f32 {
    self.data[channel * self.height * self.width + h * self.width + w]
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }
}

/// 张量转储格式: `{"dims": [...], "data": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDump {
  pub dims: Vec<usize>,
  pub data: Vec<f32>,
}

impl TensorDump {
  pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
    Self { dims, data }
  }

  /// 形状等于 `expected`，或只多出一个值为 1 的批次维度
  pub fn fits(&self, expected: &[usize]) -> bool {
    if self.dims == expected {
      return true;
    }
    matches!(self.dims.split_first(), Some((1, rest)) if rest == expected)
  }

  fn check(&self, name: &'static str, expected: &[usize]) -> Result<(), SegmentError> {
    let declared: usize = self.dims.iter().product();
    if declared != self.data.len() {
      error!(
        "张量 {} 声明形状 {:?} 与数据长度 {} 不一致",
        name,
        self.dims,
        self.data.len()
      );
      return Err(SegmentError::malformed(name, declared, self.data.len()));
    }
    if !self.fits(expected) {
      error!(
        "张量 {} 形状不匹配: 期望 {:?}, 实际 {:?}",
        name, expected, self.dims
      );
      return Err(SegmentError::ShapeMismatch {
        name,
        expected: expected.to_vec(),
        actual: self.dims.clone(),
      });
    }
    Ok(())
  }
}

/// 推理引擎的两个输出张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutputs {
  pub output0: TensorDump,
  #[serde(default)]
  pub output1: Option<TensorDump>,
}

impl RawOutputs {
  pub fn new(output0: TensorDump, output1: Option<TensorDump>) -> Self {
    Self { output0, output1 }
  }

  pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(text)
  }

  /// 按配置校验两个张量的形状
  pub fn validate(&self, config: &SegConfig) -> Result<(), SegmentError> {
    self.output0.check(
      DETECTION_TENSOR_NAME,
      &[config.detection_channels(), config.num_anchors],
    )?;

    if config.has_masks {
      let proto = self
        .output1
        .as_ref()
        .ok_or(SegmentError::MissingTensor(PROTOTYPE_TENSOR_NAME))?;
      proto.check(
        PROTOTYPE_TENSOR_NAME,
        &[config.num_mask_coeffs, config.proto_height, config.proto_width],
      )?;
    }

    debug!(
      "输出张量校验通过: {} = {:?}, {} = {:?}",
      DETECTION_TENSOR_NAME,
      self.output0.dims,
      PROTOTYPE_TENSOR_NAME,
      self.output1.as_ref().map(|t| &t.dims)
    );
    Ok(())
  }

  pub fn detection<'a>(&'a self, config: &SegConfig) -> Result<DetectionTensor<'a>, SegmentError> {
    DetectionTensor::new(&self.output0.data, config)
  }

  pub fn prototype<'a>(
    &'a self,
    config: &SegConfig,
  ) -> Result<Option<PrototypeTensor<'a>>, SegmentError> {
    if !config.has_masks {
      return Ok(None);
    }
    let proto = self
      .output1
      .as_ref()
      .ok_or(SegmentError::MissingTensor(PROTOTYPE_TENSOR_NAME))?;
    PrototypeTensor::new(&proto.data, config).map(Some)
  }
}
