// 该文件是 Banma （斑马） 项目的一部分。
// src/config.rs - 流水线配置
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::output::EncodeFormat;

/// COCO 类别表中 "person" 的索引
pub const DEFAULT_PERSON_CLASS_ID: u32 = 0;
/// 行人数量严格大于该值时优先行人
pub const DEFAULT_PRIORITY_THRESHOLD: usize = 5;
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_LINE_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("解析配置文件错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 流水线配置
///
/// `person_class_id` 是与检测器类别体系之间的外部约定，不同的类别体系
/// 可能给 "person" 分配不同的索引，因此必须显式配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// 检测器类别体系中 "person" 的类别索引
  pub person_class_id: u32,
  /// 优先级阈值，行人数 > 阈值 时优先行人
  pub priority_threshold: usize,
  /// 计数时的最低置信度；`None` 表示完全信任检测器自身的阈值
  pub min_score: Option<f32>,
  /// 渲染配置
  pub render: RenderConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      person_class_id: DEFAULT_PERSON_CLASS_ID,
      priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
      min_score: None,
      render: RenderConfig::default(),
    }
  }
}

/// 标注图渲染配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
  pub format: EncodeFormat,
  pub jpeg_quality: u8,
  pub draw_labels: bool,
  pub line_thickness: u32,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      format: EncodeFormat::Jpeg,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      draw_labels: true,
      line_thickness: DEFAULT_LINE_THICKNESS,
    }
  }
}

impl PipelineConfig {
  /// 从 JSON 文件加载配置，缺失的字段使用默认值
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    debug!("加载配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(score) = self.min_score
      && !(0.0..=1.0).contains(&score)
    {
      return Err(ConfigError::Invalid(format!(
        "min_score 必须位于 [0, 1] 区间, 实际为 {}",
        score
      )));
    }
    self.render.validate()
  }
}

impl RenderConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(1..=100).contains(&self.jpeg_quality) {
      return Err(ConfigError::Invalid(format!(
        "jpeg_quality 必须位于 1..=100, 实际为 {}",
        self.jpeg_quality
      )));
    }
    if self.line_thickness == 0 {
      return Err(ConfigError::Invalid("line_thickness 不能为 0".to_string()));
    }
    Ok(())
  }
}
