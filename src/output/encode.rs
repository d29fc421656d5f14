// 该文件是 Banma （斑马） 项目的一部分。
// src/output/encode.rs - 标注图编码
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

use std::{io::Cursor, str::FromStr};

use image::{
  RgbImage,
  codecs::{jpeg::JpegEncoder, png::PngEncoder},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RenderConfig;

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 传输用的压缩格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
  #[default]
  Jpeg,
  Png,
}

impl EncodeFormat {
  pub fn mime_type(&self) -> &'static str {
    match self {
      EncodeFormat::Jpeg => "image/jpeg",
      EncodeFormat::Png => "image/png",
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      EncodeFormat::Jpeg => "jpg",
      EncodeFormat::Png => "png",
    }
  }
}

impl FromStr for EncodeFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "jpg" | "jpeg" => Ok(EncodeFormat::Jpeg),
      "png" => Ok(EncodeFormat::Png),
      other => Err(format!("不支持的编码格式: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEncoder {
  format: EncodeFormat,
  jpeg_quality: u8,
}

impl From<&RenderConfig> for ImageEncoder {
  fn from(config: &RenderConfig) -> Self {
    Self::new(config.format, config.jpeg_quality)
  }
}

impl ImageEncoder {
  pub fn new(format: EncodeFormat, jpeg_quality: u8) -> Self {
    Self {
      format,
      jpeg_quality: jpeg_quality.clamp(1, 100),
    }
  }

  pub fn format(&self) -> EncodeFormat {
    self.format
  }

  /// 编码整幅图像，失败时不返回任何部分结果
  pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(EncodeError::EmptyImage { width, height });
    }

    let mut buf = Cursor::new(Vec::new());
    match self.format {
      EncodeFormat::Jpeg => {
        image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality))?
      }
      EncodeFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf))?,
    }
    Ok(buf.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn encodes_png_losslessly() {
    let image = RgbImage::from_pixel(5, 4, Rgb([12, 34, 56]));
    let bytes = ImageEncoder::new(EncodeFormat::Png, 90).encode(&image).unwrap();
    assert_eq!(&bytes[1..4], b"PNG");
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded, image);
  }

  #[test]
  fn encodes_jpeg() {
    let image = RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]));
    let bytes = ImageEncoder::new(EncodeFormat::Jpeg, 80).encode(&image).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
  }

  #[test]
  fn empty_image_fails() {
    let image = RgbImage::new(0, 10);
    assert!(matches!(
      ImageEncoder::new(EncodeFormat::Png, 90).encode(&image),
      Err(EncodeError::EmptyImage { .. })
    ));
  }

  #[test]
  fn parses_format_names() {
    assert_eq!("JPG".parse::<EncodeFormat>(), Ok(EncodeFormat::Jpeg));
    assert_eq!("png".parse::<EncodeFormat>(), Ok(EncodeFormat::Png));
    assert!("gif".parse::<EncodeFormat>().is_err());
  }
}
