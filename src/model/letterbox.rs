// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/letterbox.rs - 补边缩放预处理
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

use fast_image_resize::{
  FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
  images::{Image, ImageRef},
};
use image::{Rgb, RgbImage, imageops};
use tracing::debug;

use crate::{
  frame::{FrameGeometry, LetterboxFrame},
  model::SegmentError,
};

/// 把任意尺寸的图像右/下补黑边成正方形，再按面积平均缩放到 `S x S`，
/// 输出归一化的 NCHW 浮点帧
pub fn letterbox<const S: u32>(
  image: &RgbImage,
) -> Result<(LetterboxFrame<S>, FrameGeometry), SegmentError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(SegmentError::InvalidImage(format!(
      "图像尺寸为 {}x{}",
      width, height
    )));
  }

  let geometry = FrameGeometry::new(width, height);
  debug!(
    "补边: {}x{} -> {}x{} (右 {}, 下 {})",
    width,
    height,
    geometry.padded_size,
    geometry.padded_size,
    geometry.pad_right(),
    geometry.pad_bottom()
  );

  let resized = if geometry.pad_right() == 0 && geometry.pad_bottom() == 0 {
    area_resize(image, S, S)?
  } else {
    let mut padded = RgbImage::from_pixel(geometry.padded_size, geometry.padded_size, Rgb([0, 0, 0]));
    imageops::replace(&mut padded, image, 0, 0);
    area_resize(&padded, S, S)?
  };

  let mut frame = LetterboxFrame::<S>::default();
  let (size, channels) = (frame.size(), frame.channels());
  let slice = frame.as_mut();
  for (w, h, pixel) in resized.enumerate_pixels() {
    for c in 0..channels {
      let index = c * size * size + (h as usize) * size + (w as usize);
      slice[index] = pixel[c] as f32 / 255.0;
    }
  }

  Ok((frame, geometry))
}

/// 面积平均缩放，缩小时可避免混叠
pub fn area_resize(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage, SegmentError> {
  let (src_w, src_h) = image.dimensions();
  if (src_w, src_h) == (width, height) {
    return Ok(image.clone());
  }
  if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
    return Ok(RgbImage::new(width, height));
  }

  let src_view = ImageRef::new(src_w, src_h, image.as_raw(), PixelType::U8x3)
    .map_err(|e| SegmentError::Resize(e.to_string()))?;
  let mut dst_view = Image::new(width, height, PixelType::U8x3);
  let options = ResizeOptions::new()
    .resize_alg(ResizeAlg::Convolution(FilterType::Box))
    .use_alpha(false);
  Resizer::new()
    .resize(&src_view, &mut dst_view, &options)
    .map_err(|e| SegmentError::Resize(e.to_string()))?;

  RgbImage::from_raw(width, height, dst_view.into_vec())
    .ok_or_else(|| SegmentError::Resize(format!("缩放结果与 {}x{} 不符", width, height)))
}
