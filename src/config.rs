// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 后处理配置
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

use std::{collections::HashMap, str::FromStr};

use thiserror::Error;
use tracing::{error, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, labels::LabelSet};

pub const YOLO_SEG_CLASS_NUM: usize = 32;
pub const YOLO_SEG_MASK_NUM: usize = 32;
pub const YOLO_SEG_ANCHOR_NUM: usize = 8400;
pub const YOLO_SEG_PROTO_H: usize = 160;
pub const YOLO_SEG_PROTO_W: usize = 160;
pub const YOLO_SEG_INPUT_SIZE: u32 = 640;
/// NMS 之前的低阈值，冗余检测交给 NMS 去除
pub const YOLO_SEG_CONF_THRESH: f32 = 0.05;
/// 不做 NMS 时建议的最低阈值
pub const YOLO_SEG_CONF_THRESH_NO_NMS: f32 = 0.2;
pub const YOLO_SEG_IOU_THRESH: f32 = 0.7;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: String, found: String },
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("阈值 {name} 超出 [0, 1] 范围: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("维度 {0} 不能为 0")]
  ZeroDimension(&'static str),
  #[error("标签数量 {labels} 与类别数量 {classes} 不一致")]
  LabelCountMismatch { labels: usize, classes: usize },
}

/// NMS 策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Suppression {
  /// 不区分类别，高置信度框抑制任意类别的重叠框
  #[default]
  ClassAgnostic,
  /// 按类别分组后分别抑制
  ClassAware,
  Disabled,
}

impl FromStr for Suppression {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "agnostic" => Ok(Suppression::ClassAgnostic),
      "aware" => Ok(Suppression::ClassAware),
      "off" | "none" => Ok(Suppression::Disabled),
      _ => Err(()),
    }
  }
}

/// 网络坐标到原图坐标的映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxMapping {
  /// 按补边后的正方形边长反算，宽高不等时也不会变形
  #[default]
  Letterbox,
  /// 直接按原图宽高反算，只适用于拉伸（未补边）输入
  Stretch,
}

impl FromStr for BoxMapping {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "letterbox" => Ok(BoxMapping::Letterbox),
      "stretch" => Ok(BoxMapping::Stretch),
      _ => Err(()),
    }
  }
}

/// YOLO 实例分割后处理配置
#[derive(Debug, Clone, PartialEq)]
pub struct SegConfig {
  pub num_classes: usize,
  pub num_mask_coeffs: usize,
  pub num_anchors: usize,
  pub proto_height: usize,
  pub proto_width: usize,
  pub input_size: u32,
  pub has_masks: bool,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  pub suppression: Suppression,
  pub box_mapping: BoxMapping,
  pub labels: LabelSet,
}

impl Default for SegConfig {
  fn default() -> Self {
    Self {
      num_classes: YOLO_SEG_CLASS_NUM,
      num_mask_coeffs: YOLO_SEG_MASK_NUM,
      num_anchors: YOLO_SEG_ANCHOR_NUM,
      proto_height: YOLO_SEG_PROTO_H,
      proto_width: YOLO_SEG_PROTO_W,
      input_size: YOLO_SEG_INPUT_SIZE,
      has_masks: true,
      confidence_threshold: YOLO_SEG_CONF_THRESH,
      iou_threshold: YOLO_SEG_IOU_THRESH,
      suppression: Suppression::default(),
      box_mapping: BoxMapping::default(),
      labels: LabelSet::default(),
    }
  }
}

impl SegConfig {
  /// 80 类 COCO 模型
  pub fn coco() -> Self {
    Self {
      num_classes: crate::labels::COCO_CLASSES.len(),
      labels: LabelSet::coco(),
      ..Self::default()
    }
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_suppression(mut self, suppression: Suppression) -> Self {
    self.suppression = suppression;
    self
  }

  pub fn with_box_mapping(mut self, mapping: BoxMapping) -> Self {
    self.box_mapping = mapping;
    self
  }

  pub fn with_masks(mut self, has_masks: bool) -> Self {
    self.has_masks = has_masks;
    self
  }

  pub fn with_anchors(mut self, num_anchors: usize) -> Self {
    self.num_anchors = num_anchors;
    self
  }

  pub fn with_proto_shape(mut self, height: usize, width: usize) -> Self {
    self.proto_height = height;
    self.proto_width = width;
    self
  }

  /// 同时设置标签与类别数量
  pub fn with_labels(mut self, labels: LabelSet) -> Self {
    self.num_classes = labels.len();
    self.labels = labels;
    self
  }

  /// 检测张量的通道数
  pub fn detection_channels(&self) -> usize {
    4 + self.num_classes + self.mask_channels()
  }

  pub fn mask_channels(&self) -> usize {
    if self.has_masks { self.num_mask_coeffs } else { 0 }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence", self.confidence_threshold),
      ("iou", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }

    let dims = [
      ("classes", self.num_classes),
      ("anchors", self.num_anchors),
      ("input", self.input_size as usize),
    ];
    for (name, value) in dims {
      if value == 0 {
        return Err(ConfigError::ZeroDimension(name));
      }
    }
    if self.has_masks {
      let dims = [
        ("masks", self.num_mask_coeffs),
        ("proto_height", self.proto_height),
        ("proto_width", self.proto_width),
      ];
      for (name, value) in dims {
        if value == 0 {
          return Err(ConfigError::ZeroDimension(name));
        }
      }
    }

    if self.labels.len() != self.num_classes {
      return Err(ConfigError::LabelCountMismatch {
        labels: self.labels.len(),
        classes: self.num_classes,
      });
    }

    if self.suppression == Suppression::Disabled
      && self.confidence_threshold < YOLO_SEG_CONF_THRESH_NO_NMS
    {
      warn!(
        "未启用 NMS, 置信度阈值 {} 低于建议值 {}, 结果中会有大量重复框",
        self.confidence_threshold, YOLO_SEG_CONF_THRESH_NO_NMS
      );
    }

    Ok(())
  }
}

fn parse_query<T: FromStr>(
  pairs: &HashMap<String, String>,
  key: &str,
) -> Result<Option<T>, ConfigError> {
  match pairs.get(key) {
    None => Ok(None),
    Some(value) => value
      .parse()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.clone(),
      }),
  }
}

/// 解析 `160x160` 形式的尺寸
fn parse_shape(key: &str, value: &str) -> Result<(usize, usize), ConfigError> {
  let invalid = || ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  };
  match value.split_once('x') {
    Some((h, w)) => Ok((
      h.parse().map_err(|_| invalid())?,
      w.parse().map_err(|_| invalid())?,
    )),
    None => {
      let side = value.parse().map_err(|_| invalid())?;
      Ok((side, side))
    }
  }
}

impl FromUrlWithScheme for SegConfig {
  const SCHEME: &'static str = "yoloseg";
}

impl FromUrl for SegConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ConfigError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        found: url.scheme().to_string(),
      });
    }

    let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let mut config = match pairs.get("labels").map(String::as_str) {
      None | Some("tier") => SegConfig::default(),
      Some("coco") => SegConfig::coco(),
      Some(other) => {
        return Err(ConfigError::InvalidValue {
          key: "labels".to_string(),
          value: other.to_string(),
        });
      }
    };

    if let Some(classes) = parse_query::<usize>(&pairs, "classes")? {
      config.num_classes = classes;
    }
    if let Some(masks) = parse_query::<usize>(&pairs, "masks")? {
      config.has_masks = masks > 0;
      if masks > 0 {
        config.num_mask_coeffs = masks;
      }
    }
    if let Some(anchors) = parse_query(&pairs, "anchors")? {
      config.num_anchors = anchors;
    }
    if let Some(proto) = pairs.get("proto") {
      let (h, w) = parse_shape("proto", proto)?;
      config.proto_height = h;
      config.proto_width = w;
    }
    if let Some(input) = parse_query(&pairs, "input")? {
      config.input_size = input;
    }
    if let Some(conf) = parse_query(&pairs, "conf")? {
      config.confidence_threshold = conf;
    }
    if let Some(iou) = parse_query(&pairs, "iou")? {
      config.iou_threshold = iou;
    }
    if let Some(nms) = parse_query(&pairs, "nms")? {
      config.suppression = nms;
    }
    if let Some(mapping) = parse_query(&pairs, "mapping")? {
      config.box_mapping = mapping;
    }

    config.validate()?;
    Ok(config)
  }
}

impl FromStr for SegConfig {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let url = Url::parse(s).map_err(|_| ConfigError::InvalidValue {
      key: "url".to_string(),
      value: s.to_string(),
    })?;
    Self::from_url(&url)
  }
}
