// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别标签与调色板索引
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

use std::collections::HashMap;

/// 分层标签数量（T11 ~ T48）
pub const TIER_LABEL_NUM: usize = 32;
const TIER_GROUP_SIZE: usize = 8;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别标签集合
///
/// 标签到调色板索引的映射在构造时一次性建立，渲染时直接查表。
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
  names: Box<[String]>,
  palette: HashMap<String, usize>,
}

impl LabelSet {
  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Box<[String]> = names.into_iter().map(Into::into).collect();
    let mut palette = HashMap::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
      // 重名时保留第一次出现的位置
      palette.entry(name.clone()).or_insert(index);
    }
    Self { names, palette }
  }

  /// 32 类分层标签：每 8 类为一组，命名为 `T{组}{序号}`
  pub fn tiered() -> Self {
    Self::from_names((0..TIER_LABEL_NUM).map(|i| {
      format!("T{}{}", i / TIER_GROUP_SIZE + 1, i % TIER_GROUP_SIZE + 1)
    }))
  }

  pub fn coco() -> Self {
    Self::from_names(COCO_CLASSES)
  }

  /// 按名称取内置标签集：`tier` 或 `coco`
  pub fn builtin(name: &str) -> Option<Self> {
    match name {
      "tier" => Some(Self::tiered()),
      "coco" => Some(Self::coco()),
      _ => None,
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 标签名，越界时返回 "unknown"
  pub fn name_or_unknown(&self, class_id: u32) -> &str {
    self.name(class_id).unwrap_or("unknown")
  }

  pub fn palette_index(&self, label: &str) -> Option<usize> {
    self.palette.get(label).copied()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::tiered()
  }
}
