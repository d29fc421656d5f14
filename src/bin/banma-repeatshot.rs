// 该文件是 Banma （斑马） 项目的一部分。
// src/bin/banma-repeatshot.rs - 重复分析同一张图像的基准测试
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use url::Url;

use banma::{
  Analyzer, FromUrl, PipelineConfig,
  input::ImageFileInput,
  model::DetectorWrapper,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// Banma 基准测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
  /// 重复次数
  #[arg(long, default_value = "1000", value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let input = ImageFileInput::from_url(&args.input)?;
  let detector = Arc::new(DetectorWrapper::from_url(&args.model)?);
  let analyzer = Analyzer::new(detector, &PipelineConfig::default());
  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  let mean = RepeatShotTask::new(args.repeat).run_task(input, &analyzer, outputs)?;
  println!("平均分析时间: {:.2?}", mean);

  Ok(())
}
