// 该文件是 Banma （斑马） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use banma::{
  Analyzer, DecisionResult, FromUrl,
  input::ImageFileInput,
  model::{DetectorWrapper, LazyDetector},
  output::OutputWrapper,
  task::{OneShotTask, ParallelTask, Task},
};

fn print_decision(name: &str, decision: &DecisionResult, json: bool) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string_pretty(decision)?);
  } else {
    println!(
      "{}: 行人数 {}, 判定 {}, 检测框 {}",
      name,
      decision.pedestrian_count,
      decision.priority_label,
      decision.annotated_image.boxes
    );
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.pipeline_config()?;

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出: {}", output);
  }
  info!("配置: {:?}", config);

  let model_url = args.model.clone();
  let detector = Arc::new(LazyDetector::new(move || {
    DetectorWrapper::from_url(&model_url)
  }));
  let analyzer = Analyzer::new(detector, &config);

  let input = ImageFileInput::from_url(&args.input)?;
  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  if input.remaining() > 1 {
    let task = args.workers.map(ParallelTask::new).unwrap_or_default();
    let results = task.run_task(input, &analyzer, outputs)?;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (name, result) in &results {
      if let Ok(decision) = result {
        print_decision(name, decision, args.json)?;
      }
    }
    if failed > 0 {
      anyhow::bail!("{} 张图像分析失败", failed);
    }
  } else {
    let name = args.input.path().to_string();
    let decision = OneShotTask.run_task(input, &analyzer, outputs)?;
    print_decision(&name, &decision, args.json)?;
  }

  Ok(())
}
