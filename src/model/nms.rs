// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::{Candidate, DetectItem};

pub trait BoxLike {
  fn bbox(&self) -> &[f32; 4];
  fn confidence(&self) -> f32;
  fn class_id(&self) -> u32;
}

impl BoxLike for Candidate {
  fn bbox(&self) -> &[f32; 4] {
    &self.bbox
  }

  fn confidence(&self) -> f32 {
    self.confidence
  }

  fn class_id(&self) -> u32 {
    self.class_id
  }
}

impl BoxLike for DetectItem {
  fn bbox(&self) -> &[f32; 4] {
    &self.bbox
  }

  fn confidence(&self) -> f32 {
    self.score
  }

  fn class_id(&self) -> u32 {
    self.class_id
  }
}

/// 计算两个边界框的 IoU，并集面积为 0 时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 不区分类别的贪心 NMS
///
/// 按置信度稳定降序排序，依次取出最高者并移除与其 IoU >= 阈值的剩余框。
pub fn suppress<T: BoxLike>(mut items: Vec<T>, iou_threshold: f32) -> Vec<T> {
  let total = items.len();
  items.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

  let mut result = Vec::new();
  let mut remaining = items.into_iter();
  let mut pending: Vec<T> = Vec::new();
  while let Some(best) = remaining.next() {
    pending.extend(remaining.filter(|item| iou(best.bbox(), item.bbox()) < iou_threshold));
    result.push(best);
    remaining = std::mem::take(&mut pending).into_iter();
  }

  debug!("NMS: {} -> {} 个框 (阈值 {})", total, result.len(), iou_threshold);
  result
}

/// 带输入序号的框，分组后仍能按原始顺序排列
struct Indexed<T> {
  index: usize,
  item: T,
}

impl<T: BoxLike> BoxLike for Indexed<T> {
  fn bbox(&self) -> &[f32; 4] {
    self.item.bbox()
  }

  fn confidence(&self) -> f32 {
    self.item.confidence()
  }

  fn class_id(&self) -> u32 {
    self.item.class_id()
  }
}

/// 按类别分组后分别做 NMS，结果按置信度降序，相同置信度保持输入顺序
pub fn suppress_per_class<T: BoxLike>(items: Vec<T>, iou_threshold: f32) -> Vec<T> {
  let mut groups: Vec<(u32, Vec<Indexed<T>>)> = Vec::new();
  for (index, item) in items.into_iter().enumerate() {
    let class_id = item.class_id();
    let item = Indexed { index, item };
    match groups.iter_mut().find(|(id, _)| *id == class_id) {
      Some((_, group)) => group.push(item),
      None => groups.push((class_id, vec![item])),
    }
  }

  let mut result: Vec<Indexed<T>> = groups
    .into_iter()
    .flat_map(|(_, group)| suppress(group, iou_threshold))
    .collect();
  result.sort_by(|a, b| {
    b.confidence()
      .total_cmp(&a.confidence())
      .then(a.index.cmp(&b.index))
  });
  result.into_iter().map(|indexed| indexed.item).collect()
}
