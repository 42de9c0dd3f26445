// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 回放已记录的推理输出
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::InferenceEngine, tensor::RawOutputs};

#[derive(Error, Debug)]
pub enum ReplayEngineError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 从 JSON 转储文件读取 `output0` / `output1`，每次推理都返回同一份输出
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  outputs: RawOutputs,
}

impl ReplayEngine {
  pub fn new(outputs: RawOutputs) -> Self {
    Self { outputs }
  }

  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReplayEngineError> {
    let path = path.as_ref();
    info!("加载张量文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    debug!(
      "张量文件大小: {:.2} MB",
      text.len() as f64 / (1024.0 * 1024.0)
    );
    let outputs = RawOutputs::from_json(&text)?;
    debug!(
      "output0 形状 {:?}, output1 形状 {:?}",
      outputs.output0.dims,
      outputs.output1.as_ref().map(|t| &t.dims)
    );
    Ok(Self { outputs })
  }

  pub fn outputs(&self) -> &RawOutputs {
    &self.outputs
  }
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayEngineError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = std::convert::Infallible;

  fn run(&self, _input: &[f32]) -> Result<RawOutputs, Self::Error> {
    Ok(self.outputs.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("image:///tmp/a.json").unwrap();
    assert!(matches!(
      ReplayEngine::from_url(&url),
      Err(ReplayEngineError::SchemeMismatch)
    ));
  }

  #[test]
  fn missing_file_is_io_error() {
    let url = Url::parse("tensor:///definitely/not/here.json").unwrap();
    assert!(matches!(
      ReplayEngine::from_url(&url),
      Err(ReplayEngineError::IoError(_))
    ));
  }

  #[test]
  fn replays_loaded_outputs() {
    let path = std::env::temp_dir().join(format!("shanan-seg-replay-{}.json", std::process::id()));
    std::fs::write(
      &path,
      r#"{"output0": {"dims": [2, 1], "data": [1.0, 2.0]}}"#,
    )
    .unwrap();
    let engine = ReplayEngine::open(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let outputs = engine.run(&[]).unwrap();
    assert_eq!(outputs.output0.data, vec![1.0, 2.0]);
    assert!(outputs.output1.is_none());
  }
}
