// 该文件是 Banma （斑马） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{EncodeFormat, Publish},
  pipeline::DecisionResult,
};

/// 把已编码的标注图原样写入 `image:///path/out.jpg`
pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_bytes(&self, bytes: &[u8]) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.path, bytes)?;
    Ok(())
  }
}

impl Publish for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error> {
    let format = decision.annotated_image.format;
    let extension_matches = self
      .path
      .extension()
      .and_then(|ext| ext.to_str())
      .and_then(|ext| ext.parse::<EncodeFormat>().ok())
      .is_some_and(|ext_format| ext_format == format);
    if !extension_matches {
      warn!(
        "文件扩展名与编码格式 {} 不一致: {}",
        format.extension(),
        self.path.display()
      );
    }

    self.save_bytes(&decision.annotated_image.bytes)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(())
  }
}
