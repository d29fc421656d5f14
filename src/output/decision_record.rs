// 该文件是 Banma （斑马） 项目的一部分。
// src/output/decision_record.rs - 决策记录输出
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
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Publish,
  pipeline::DecisionResult,
};

/// 以 JSON 写出完整决策，包括检测列表
///
/// 写出的文件可以再用 `record://` 检测器回放。
pub struct DecisionRecordOutput {
  path: PathBuf,
  pretty: bool,
}

#[derive(Error, Debug)]
pub enum DecisionRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for DecisionRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for DecisionRecordOutput {
  type Error = DecisionRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DecisionRecordError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    // json:///out.json?pretty=false
    let pretty = uri
      .query_pairs()
      .find(|(k, _)| k == "pretty")
      .is_none_or(|(_, v)| v != "false" && v != "0");

    Ok(DecisionRecordOutput {
      path: PathBuf::from(uri.path()),
      pretty,
    })
  }
}

impl DecisionRecordOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      pretty: true,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Publish for DecisionRecordOutput {
  type Error = DecisionRecordError;

  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    if self.pretty {
      serde_json::to_writer_pretty(&mut writer, decision)?;
    } else {
      serde_json::to_writer(&mut writer, decision)?;
    }
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!("写出决策记录: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pretty_flag_from_query() {
    let url = Url::parse("json:///tmp/out.json?pretty=false").unwrap();
    let output = DecisionRecordOutput::from_url(&url).unwrap();
    assert!(!output.pretty);
    assert_eq!(output.path(), Path::new("/tmp/out.json"));

    let url = Url::parse("json:///tmp/out.json").unwrap();
    assert!(DecisionRecordOutput::from_url(&url).unwrap().pretty);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("image:///tmp/out.jpg").unwrap();
    assert!(matches!(
      DecisionRecordOutput::from_url(&url),
      Err(DecisionRecordError::SchemeMismatch(_))
    ));
  }
}
