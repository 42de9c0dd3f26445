// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 分割流程集成测试
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

use approx::assert_abs_diff_eq;
use image::RgbImage;
use url::Url;

use shanan_seg::{
  FromUrl,
  config::{BoxMapping, SegConfig, Suppression},
  frame::FrameGeometry,
  labels::LabelSet,
  model::{Model, ReplayEngine, YoloSeg, YoloSegBuilder, postprocess},
  tensor::{RawOutputs, TensorDump},
};

const ANCHORS: usize = 3;
const CHANNELS: usize = 4 + 2 + 1;

fn config() -> SegConfig {
  let mut config = SegConfig::default()
    .with_labels(LabelSet::from_names(["cat", "dog"]))
    .with_anchors(ANCHORS)
    .with_proto_shape(4, 4)
    .with_confidence_threshold(0.5)
    .with_iou_threshold(0.7);
  config.num_mask_coeffs = 1;
  config
}

/// 每个锚点一行 `[xc, yc, w, h, cat, dog, coeff]`，转为通道优先布局
fn outputs(anchors: [[f32; CHANNELS]; ANCHORS]) -> RawOutputs {
  let mut data = vec![0.0; CHANNELS * ANCHORS];
  for (anchor, values) in anchors.iter().enumerate() {
    for (channel, value) in values.iter().enumerate() {
      data[channel * ANCHORS + anchor] = *value;
    }
  }
  RawOutputs::new(
    TensorDump::new(vec![1, CHANNELS, ANCHORS], data),
    Some(TensorDump::new(vec![1, 1, 4, 4], vec![2.0; 16])),
  )
}

#[test]
fn separated_objects_survive_in_score_order() {
  let engine = ReplayEngine::new(outputs([
    [400.0, 300.0, 60.0, 40.0, 0.1, 0.6, 1.0],
    [100.0, 100.0, 50.0, 50.0, 0.8, 0.2, 1.0],
    [500.0, 100.0, 50.0, 50.0, 0.3, 0.4, 1.0],
  ]));
  let model: YoloSeg<ReplayEngine> = YoloSegBuilder::new(config()).build(engine).unwrap();

  let result = model.infer(&RgbImage::new(640, 480)).unwrap();
  assert_eq!(result.len(), 2);

  let first = &result.items[0];
  assert_eq!(first.label, "cat");
  assert_abs_diff_eq!(first.score, 0.8);
  assert_abs_diff_eq!(first.bbox[0], 75.0, epsilon = 1e-3);
  assert_abs_diff_eq!(first.bbox[1], 75.0, epsilon = 1e-3);
  assert_abs_diff_eq!(first.bbox[2], 125.0, epsilon = 1e-3);
  assert_abs_diff_eq!(first.bbox[3], 125.0, epsilon = 1e-3);

  let second = &result.items[1];
  assert_eq!(second.label, "dog");
  assert_eq!(second.class_id, 1);
  assert_abs_diff_eq!(second.score, 0.6);

  let mask = first.mask.as_ref().unwrap();
  assert_eq!((mask.width(), mask.height()), (50, 50));
  let expected = 1.0 / (1.0 + (-2.0f32).exp());
  assert!(
    mask
      .as_slice()
      .iter()
      .all(|v| (v - expected).abs() < 1e-5)
  );
}

#[test]
fn overlapping_objects_are_suppressed() {
  let raw = outputs([
    [100.0, 100.0, 50.0, 50.0, 0.9, 0.0, 1.0],
    [102.0, 100.0, 50.0, 50.0, 0.0, 0.7, 1.0],
    [400.0, 400.0, 50.0, 50.0, 0.6, 0.0, 1.0],
  ]);
  let geometry = FrameGeometry::new(640, 640);

  let agnostic = postprocess(&config(), &raw, &geometry).unwrap();
  let scores: Vec<f32> = agnostic.items.iter().map(|item| item.score).collect();
  assert_eq!(scores, vec![0.9, 0.6]);

  let aware = postprocess(
    &config().with_suppression(Suppression::ClassAware),
    &raw,
    &geometry,
  )
  .unwrap();
  assert_eq!(aware.len(), 3);

  let disabled = postprocess(
    &config().with_suppression(Suppression::Disabled),
    &raw,
    &geometry,
  )
  .unwrap();
  assert_eq!(disabled.len(), 3);
}

#[test]
fn boxes_map_back_through_padding() {
  // 1000x500 补边为 1000x1000，网络坐标放大 1000 / 640 倍
  let raw = outputs([
    [320.0, 160.0, 64.0, 32.0, 0.9, 0.0, 1.0],
    [0.0; CHANNELS],
    [0.0; CHANNELS],
  ]);
  let geometry = FrameGeometry::new(1000, 500);
  let result = postprocess(&config(), &raw, &geometry).unwrap();
  assert_eq!(result.len(), 1);
  let item = &result.items[0];
  assert_abs_diff_eq!(item.bbox[0], 450.0, epsilon = 1e-3);
  assert_abs_diff_eq!(item.bbox[1], 225.0, epsilon = 1e-3);
  assert_abs_diff_eq!(item.bbox[2], 550.0, epsilon = 1e-3);
  assert_abs_diff_eq!(item.bbox[3], 275.0, epsilon = 1e-3);

  let mask = item.mask.as_ref().unwrap();
  assert_eq!((mask.width(), mask.height()), (100, 50));

  let stretched = postprocess(
    &config().with_box_mapping(BoxMapping::Stretch),
    &raw,
    &geometry,
  )
  .unwrap();
  let bbox = stretched.items[0].bbox;
  assert_abs_diff_eq!(bbox[0], 450.0, epsilon = 1e-3);
  assert_abs_diff_eq!(bbox[1], 112.5, epsilon = 1e-3);
  assert_abs_diff_eq!(bbox[2], 550.0, epsilon = 1e-3);
  assert_abs_diff_eq!(bbox[3], 137.5, epsilon = 1e-3);
}

#[test]
fn confidence_at_threshold_is_kept() {
  let raw = outputs([
    [100.0, 100.0, 50.0, 50.0, 0.5, 0.0, 1.0],
    [400.0, 400.0, 50.0, 50.0, 0.0, 0.4999, 1.0],
    [0.0; CHANNELS],
  ]);
  let result = postprocess(&config(), &raw, &FrameGeometry::new(640, 640)).unwrap();
  assert_eq!(result.len(), 1);
  assert_abs_diff_eq!(result.items[0].score, 0.5);
}

#[test]
fn replays_tensors_from_url() {
  let path = std::env::temp_dir().join(format!("shanan-seg-pipeline-{}.json", std::process::id()));
  let raw = outputs([
    [100.0, 100.0, 50.0, 50.0, 0.9, 0.0, 1.0],
    [0.0; CHANNELS],
    [0.0; CHANNELS],
  ]);
  let json = serde_json::json!({
    "output0": { "dims": raw.output0.dims, "data": raw.output0.data },
    "output1": { "dims": [1, 1, 4, 4], "data": vec![2.0f32; 16] },
  });
  std::fs::write(&path, json.to_string()).unwrap();

  let url = Url::parse(&format!("tensor://{}", path.display())).unwrap();
  let engine = ReplayEngine::from_url(&url).unwrap();
  std::fs::remove_file(&path).unwrap();

  let model: YoloSeg<ReplayEngine> = YoloSegBuilder::new(config()).build(engine).unwrap();
  let result = model.infer(&RgbImage::new(320, 320)).unwrap();
  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].label, "cat");
  // 320x320 不补边，网络坐标缩小一半
  assert_abs_diff_eq!(result.items[0].bbox[0], 37.5, epsilon = 1e-3);
}

#[test]
fn malformed_outputs_fail_without_panicking() {
  let mut raw = outputs([[0.0; CHANNELS]; ANCHORS]);
  raw.output1 = None;
  assert!(postprocess(&config(), &raw, &FrameGeometry::new(640, 640)).is_err());

  let empty = RgbImage::new(0, 0);
  let model: YoloSeg<ReplayEngine> = YoloSegBuilder::new(config())
    .build(ReplayEngine::new(outputs([[0.0; CHANNELS]; ANCHORS])))
    .unwrap();
  assert!(model.infer(&empty).is_err());
}
