// 该文件是 Banma （斑马） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use banma::{PipelineConfig, config::ConfigError, output::EncodeFormat};
use clap::Parser;
use url::Url;

/// Banma 行人优先信号判定
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  /// - onnx:///path/yolov8n.onnx?conf=0.25&iou=0.45
  /// - record:///path/detections.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源: image:///path/scene.jpg 或 image:///path/dir
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出，可重复: image:///out.jpg, json:///out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// "person" 的类别索引
  #[arg(long, value_name = "ID")]
  pub person_class_id: Option<u32>,

  /// 优先级阈值，行人数大于该值时优先行人
  #[arg(long, value_name = "COUNT")]
  pub threshold: Option<usize>,

  /// 计数时的最低置信度 (0.0 - 1.0)
  #[arg(long, value_name = "SCORE")]
  pub min_score: Option<f32>,

  /// 标注图编码格式: jpeg 或 png
  #[arg(long, value_name = "FORMAT")]
  pub format: Option<EncodeFormat>,

  /// 工作线程数，仅在输入为目录时使用
  #[arg(long, value_name = "N")]
  pub workers: Option<usize>,

  /// 以 JSON 打印完整决策
  #[arg(long)]
  pub json: bool,
}

impl Args {
  /// 加载配置文件，再用命令行参数覆盖
  pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::from_file(path)?,
      None => PipelineConfig::default(),
    };

    if let Some(id) = self.person_class_id {
      config.person_class_id = id;
    }
    if let Some(threshold) = self.threshold {
      config.priority_threshold = threshold;
    }
    if self.min_score.is_some() {
      config.min_score = self.min_score;
    }
    if let Some(format) = self.format {
      config.render.format = format;
    }

    config.validate()?;
    Ok(config)
  }
}
