// 该文件是 Banma （斑马） 项目的一部分。
// src/model/record.rs - 回放检测记录
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

use std::path::Path;

use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectError, DetectResult, Detector},
};

/// 回放预先记录的检测结果
///
/// 记录文件是 `DetectItem` 的 JSON 数组，或 `json://` 输出写出的决策记录
/// 中的 `detections` 字段。对任何输入图像都返回同一组检测。
#[derive(Debug, Clone)]
pub struct RecordDetector {
  result: DetectResult,
}

impl FromUrlWithScheme for RecordDetector {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    Self::from_file(url.path())
  }
}

impl RecordDetector {
  pub fn new(result: DetectResult) -> Self {
    Self { result }
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DetectError> {
    let path = path.as_ref();
    info!("加载检测记录: {}", path.display());
    let content =
      std::fs::read_to_string(path).map_err(|e| DetectError::ModelLoadError(e.to_string()))?;
    let value: serde_json::Value =
      serde_json::from_str(&content).map_err(|e| DetectError::ModelLoadError(e.to_string()))?;

    let items = match value {
      serde_json::Value::Object(mut map) => map
        .remove("detections")
        .ok_or_else(|| DetectError::ModelLoadError("记录中缺少 detections 字段".to_string()))?,
      other => other,
    };
    let result: DetectResult =
      serde_json::from_value(items).map_err(|e| DetectError::ModelLoadError(e.to_string()))?;
    debug!("检测记录中共有 {} 个检测结果", result.len());

    Ok(Self { result })
  }
}

impl Detector for RecordDetector {
  fn detect(&self, _image: &RgbImage) -> Result<DetectResult, DetectError> {
    Ok(self.result.clone())
  }
}
