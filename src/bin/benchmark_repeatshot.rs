// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理性能测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_seg::{
  FromUrl,
  input::InputWrapper,
  model::{ReplayEngine, YoloSeg, YoloSegBuilder},
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 同一张图片重复分割，统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型配置，例如 yoloseg:///?conf=0.05&iou=0.7&labels=tier
  #[arg(long, value_name = "CONFIG", default_value = "yoloseg:///")]
  pub config: Url,
  /// 已记录的推理输出，例如 tensor:///path/to/outputs.json
  #[arg(long, value_name = "TENSORS")]
  pub tensors: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value_t = 1000)]
  pub repeat: usize,
  /// 不计入平均值的预热次数
  #[arg(long, default_value_t = 2)]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型配置: {}", args.config);
  info!("推理输出: {}", args.tensors);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let engine = ReplayEngine::from_url(&args.tensors)?;
  let model: YoloSeg<ReplayEngine> = YoloSegBuilder::from_url(&args.config)?.build(engine)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let task = RepeatShotTask::default()
    .with_repeat(args.repeat)
    .with_warmup(args.warmup);
  task.run_task(input, model, output)?;

  Ok(())
}
