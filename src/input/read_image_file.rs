// 该文件是 Banma （斑马） 项目的一部分。
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
// Copyright (C) 2026 Banma Contributors

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::ImageFormat;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::RawImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  EmptyDirectory(String),
}

/// 从单个图像文件或图像目录读取原始字节
///
/// 目录按文件名排序后逐个读取，读取失败的文件会被跳过。
pub struct ImageFileInput {
  pending: VecDeque<PathBuf>,
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

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;

    let pending: VecDeque<PathBuf> = if metadata.is_dir() {
      let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
      files.sort();
      if files.is_empty() {
        return Err(ImageFileInputError::EmptyDirectory(
          path.display().to_string(),
        ));
      }
      info!("图像目录 {} 中共有 {} 个文件", path.display(), files.len());
      files.into()
    } else {
      VecDeque::from([path.to_path_buf()])
    };

    Ok(Self { pending })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

/// 只接受当前 `image` 构建能够解码的扩展名
fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .and_then(|ext| ImageFormat::from_extension(ext.to_ascii_lowercase()))
    .is_some_and(|format| format.reading_enabled())
}

impl Iterator for ImageFileInput {
  type Item = RawImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match std::fs::read(&path) {
        Ok(bytes) => {
          return Some(RawImage {
            name: path.display().to_string(),
            bytes,
          });
        }
        Err(e) => warn!("读取图像文件 {} 失败: {}", path.display(), e),
      }
    }
    None
  }
}
