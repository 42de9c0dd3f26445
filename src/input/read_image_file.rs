// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::SegmentError};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("{0}")]
  InvalidImage(#[from] SegmentError),
}

/// 读取单张图片，RGBA 等格式统一转为 RGB，作为迭代器只产出一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    info!("读取图片文件: {}", path);
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(Self::from_image(image.to_rgb8())?)
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Result<Self, SegmentError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(SegmentError::InvalidImage(format!(
        "图像尺寸为 {}x{}",
        width, height
      )));
    }
    Ok(Self {
      image: Some(image),
      width,
      height,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_single_frame() {
    let mut input = ImageFileInput::from_image(RgbImage::new(4, 3)).unwrap();
    assert_eq!((input.width(), input.height()), (4, 3));
    assert!(input.next().is_some());
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_empty_image() {
    assert!(matches!(
      ImageFileInput::from_image(RgbImage::new(0, 0)),
      Err(SegmentError::InvalidImage(_))
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }

  #[test]
  fn undecodable_file_fails() {
    let path = std::env::temp_dir().join(format!("shanan-seg-bad-{}.png", std::process::id()));
    std::fs::write(&path, b"not an image").unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let result = ImageFileInput::from_url(&url);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ImageFileInputError::ImageLoadError(_))));
  }
}
