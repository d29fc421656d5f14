// 该文件是 Banma （斑马） 项目的一部分。
// src/input.rs - 图像输入与解码
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Banma Contributors

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 解码失败，输入不是受支持的图像
#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("输入数据为空")]
  Empty,
  #[error("无法识别的图像格式: {0}")]
  UnknownFormat(std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 一张尚未解码的输入图像
#[derive(Debug, Clone)]
pub struct RawImage {
  /// 来源名称，通常是文件路径
  pub name: String,
  pub bytes: Vec<u8>,
}

/// 将常见的编码图像（JPEG/PNG 等）解码为 RGB 图像
///
/// 带透明通道或灰度的图像统一转换为 RGB。
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
  if bytes.is_empty() {
    return Err(DecodeError::Empty);
  }

  let reader = ImageReader::new(std::io::Cursor::new(bytes))
    .with_guessed_format()
    .map_err(DecodeError::UnknownFormat)?;
  let format = reader.format();
  let image = reader.decode()?.to_rgb8();

  debug!(
    "解码图像: 格式 {:?}, 尺寸 {}x{}",
    format,
    image.width(),
    image.height()
  );

  Ok(image)
}
