// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo_seg.rs - YOLO 实例分割模型
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  config::{ConfigError, SegConfig, Suppression},
  frame::{AsNchwFrame, FrameGeometry},
  model::{
    DetectItem, DetectResult, Model, SegmentError, decode, letterbox, reconstruct_mask, suppress,
    suppress_per_class,
  },
  tensor::RawOutputs,
};

/// 推理引擎边界：输入 NCHW 浮点帧，返回检测张量与原型张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input: &[f32]) -> Result<RawOutputs, Self::Error>;
}

#[derive(Error, Debug)]
pub enum YoloSegError {
  #[error("后处理错误: {0}")]
  Segment(#[from] SegmentError),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("推理引擎错误: {0}")]
  Engine(Box<dyn std::error::Error + Send + Sync>),
}

impl YoloSegError {
  pub fn engine<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    YoloSegError::Engine(Box::new(err))
  }
}

/// 补边预处理 -> 推理 -> 后处理的完整流程，`S` 为网络输入边长
pub struct YoloSeg<E, const S: u32 = 640> {
  config: SegConfig,
  engine: E,
}

pub struct YoloSegBuilder {
  config: SegConfig,
}

impl FromUrl for YoloSegBuilder {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(YoloSegBuilder {
      config: SegConfig::from_url(url)?,
    })
  }
}

impl YoloSegBuilder {
  pub fn new(config: SegConfig) -> Self {
    Self { config }
  }

  pub fn config(mut self, config: SegConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build<E, const S: u32>(self, engine: E) -> Result<YoloSeg<E, S>, YoloSegError> {
    self.config.validate()?;
    if self.config.input_size != S {
      return Err(
        ConfigError::InvalidValue {
          key: "input".to_string(),
          value: self.config.input_size.to_string(),
        }
        .into(),
      );
    }

    info!(
      "创建分割模型: {} 类, {} 个掩码系数, {} 个锚点, 原型 {}x{}",
      self.config.num_classes,
      self.config.mask_channels(),
      self.config.num_anchors,
      self.config.proto_height,
      self.config.proto_width
    );
    debug!(
      "置信度阈值 {}, IoU 阈值 {}, NMS {:?}, 坐标映射 {:?}",
      self.config.confidence_threshold,
      self.config.iou_threshold,
      self.config.suppression,
      self.config.box_mapping
    );

    Ok(YoloSeg {
      config: self.config,
      engine,
    })
  }
}

impl<E, const S: u32> YoloSeg<E, S> {
  pub fn config(&self) -> &SegConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn postprocess(
    &self,
    outputs: &RawOutputs,
    geometry: &FrameGeometry,
  ) -> Result<DetectResult, SegmentError> {
    // 配置已在构建时校验
    postprocess_validated(&self.config, outputs, geometry)
  }
}

impl<E: InferenceEngine, const S: u32> Model for YoloSeg<E, S> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = YoloSegError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("补边预处理");
    let (frame, geometry) = letterbox::<S>(input)?;

    debug!("执行模型推理");
    let outputs = self
      .engine
      .run(frame.as_nchw())
      .map_err(YoloSegError::engine)?;

    debug!("后处理模型输出");
    Ok(self.postprocess(&outputs, &geometry)?)
  }
}

/// 解码 -> 去除退化框 -> NMS -> 重建掩码
///
/// 掩码只依赖候选框自身，所以在 NMS 之后重建与之前重建结果相同。
pub fn postprocess(
  config: &SegConfig,
  outputs: &RawOutputs,
  geometry: &FrameGeometry,
) -> Result<DetectResult, SegmentError> {
  config.validate()?;
  postprocess_validated(config, outputs, geometry)
}

fn postprocess_validated(
  config: &SegConfig,
  outputs: &RawOutputs,
  geometry: &FrameGeometry,
) -> Result<DetectResult, SegmentError> {
  outputs.validate(config)?;
  let detection = outputs.detection(config)?;
  let proto = outputs.prototype(config)?;
  let geometry = geometry.with_mapping(config.box_mapping);

  let candidates = decode(
    &detection,
    &geometry,
    config.input_size,
    config.confidence_threshold,
  );
  let decoded = candidates.len();
  let candidates: Vec<_> = candidates
    .into_iter()
    .filter_map(|c| c.clip_to(geometry.source_width, geometry.source_height))
    .collect();
  if candidates.len() < decoded {
    debug!("丢弃 {} 个退化框", decoded - candidates.len());
  }

  let kept = match config.suppression {
    Suppression::ClassAgnostic => suppress(candidates, config.iou_threshold),
    Suppression::ClassAware => suppress_per_class(candidates, config.iou_threshold),
    Suppression::Disabled => candidates,
  };

  let items: Box<[DetectItem]> = kept
    .into_iter()
    .map(|candidate| {
      let mask = proto
        .as_ref()
        .map(|proto| reconstruct_mask(&candidate, proto, &geometry));
      DetectItem {
        class_id: candidate.class_id,
        label: config.labels.name_or_unknown(candidate.class_id).to_string(),
        score: candidate.confidence,
        bbox: candidate.bbox,
        mask,
      }
    })
    .collect();

  debug!("检测到 {} 个物体", items.len());
  Ok(DetectResult { items })
}
