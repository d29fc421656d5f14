// 该文件是 Banma （斑马） 项目的一部分。
// src/task.rs - 任务编排
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
  panic::{AssertUnwindSafe, catch_unwind},
  sync::atomic::{AtomicUsize, Ordering},
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  input::RawImage,
  model::Detector,
  output::Publish,
  pipeline::{AnalyzeError, Analyzer, DecisionResult},
};

/// 预热轮次，不计入平均耗时
const WARMUP_ROUNDS: usize = 2;

pub trait Task<I, D, O>: Sized {
  type Output;
  type Error;
  fn run_task(
    self,
    input: I,
    analyzer: &Analyzer<D>,
    output: O,
  ) -> Result<Self::Output, Self::Error>;
}

/// 分析第一张输入图像并发布结果
pub struct OneShotTask;

impl<I, D, O, PE> Task<I, D, O> for OneShotTask
where
  I: Iterator<Item = RawImage>,
  D: Detector,
  O: Publish<Error = PE>,
  PE: std::error::Error + Send + Sync + 'static,
{
  type Output = DecisionResult;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    analyzer: &Analyzer<D>,
    output: O,
  ) -> Result<DecisionResult, Self::Error> {
    info!("开始任务...");
    let raw = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功: {}，开始分析...", raw.name);
    let now = Instant::now();
    let decision = analyzer.analyze(&raw.bytes)?;
    info!("分析完成，耗时: {:.2?}", now.elapsed());
    output.publish(&decision)?;
    info!("发布完成，耗时: {:.2?}", now.elapsed());

    Ok(decision)
  }
}

/// 基准测试: 对同一张图像重复分析，返回去掉预热后的平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn new(repeat: usize) -> Self {
    Self {
      repeat: repeat.max(WARMUP_ROUNDS + 1),
    }
  }
}

impl<I, D, O, PE> Task<I, D, O> for RepeatShotTask
where
  I: Iterator<Item = RawImage>,
  D: Detector,
  O: Publish<Error = PE>,
  PE: std::error::Error + Send + Sync + 'static,
{
  type Output = Duration;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    analyzer: &Analyzer<D>,
    output: O,
  ) -> Result<Duration, Self::Error> {
    info!("开始任务...");
    let raw = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功: {}，开始分析...", raw.name);

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let decision = analyzer.analyze(&raw.bytes)?;
      let elapsed = now.elapsed();
      info!("({})分析完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(decision);
    }
    if let Some(decision) = last {
      output.publish(&decision)?;
    }

    let measured = &times[WARMUP_ROUNDS.min(times.len() - 1)..];
    let mean = measured.iter().sum::<Duration>() / measured.len() as u32;
    warn!("平均分析时间: {:.2?}", mean);

    Ok(mean)
  }
}

/// 多个工作线程共享一个分析器，处理全部输入图像
///
/// 单张图像失败不影响其他图像；结果按输入顺序返回并依次发布。
pub struct ParallelTask {
  workers: usize,
}

impl ParallelTask {
  pub fn new(workers: usize) -> Self {
    Self {
      workers: workers.max(1),
    }
  }
}

impl Default for ParallelTask {
  fn default() -> Self {
    let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    Self::new(workers)
  }
}

/// 并行任务中单张图像的失败原因
#[derive(Error, Debug)]
pub enum ImageTaskError {
  #[error(transparent)]
  Analyze(#[from] AnalyzeError),
  #[error("分析过程中发生崩溃: {0}")]
  Panicked(String),
}

pub type NamedResult = (String, Result<DecisionResult, ImageTaskError>);

/// 分析一张图像，崩溃被转换为该图像自身的错误
fn analyze_isolated<D: Detector>(
  analyzer: &Analyzer<D>,
  raw: &RawImage,
) -> Result<DecisionResult, ImageTaskError> {
  match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&raw.bytes))) {
    Ok(result) => Ok(result?),
    Err(payload) => {
      let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "未知原因".to_string());
      Err(ImageTaskError::Panicked(message))
    }
  }
}

impl<I, D, O, PE> Task<I, D, O> for ParallelTask
where
  I: Iterator<Item = RawImage>,
  D: Detector,
  O: Publish<Error = PE>,
  PE: std::error::Error + Send + Sync + 'static,
{
  type Output = Vec<NamedResult>;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    analyzer: &Analyzer<D>,
    output: O,
  ) -> Result<Vec<NamedResult>, Self::Error> {
    let images: Vec<RawImage> = input.collect();
    if images.is_empty() {
      anyhow::bail!("没有输入图像");
    }
    let workers = self.workers.min(images.len());
    info!("开始任务: {} 张图像, {} 个工作线程", images.len(), workers);

    let next = AtomicUsize::new(0);
    let now = Instant::now();
    let mut indexed: Vec<(usize, Result<DecisionResult, ImageTaskError>)> = thread::scope(|s| {
      let next = &next;
      let images = &images;
      let handles: Vec<_> = (0..workers)
        .map(|_| {
          s.spawn(move || {
            let mut done = Vec::new();
            loop {
              let index = next.fetch_add(1, Ordering::Relaxed);
              let Some(raw) = images.get(index) else {
                break;
              };
              done.push((index, analyze_isolated(analyzer, raw)));
            }
            done
          })
        })
        .collect();
      handles
        .into_iter()
        .flat_map(|h| {
          h.join().unwrap_or_else(|_| {
            error!("工作线程异常退出");
            Vec::new()
          })
        })
        .collect()
    });
    if indexed.len() != images.len() {
      anyhow::bail!("仅得到 {}/{} 张图像的结果", indexed.len(), images.len());
    }
    indexed.sort_by_key(|(index, _)| *index);
    info!("全部分析完成，耗时: {:.2?}", now.elapsed());

    let mut results = Vec::with_capacity(indexed.len());
    for (index, result) in indexed {
      let name = images[index].name.clone();
      match &result {
        Ok(decision) => {
          info!(
            "{}: 行人数 {}, 判定 {}",
            name, decision.pedestrian_count, decision.priority_label
          );
          output.publish(decision)?;
        }
        Err(e) => error!("{}: 分析失败: {}", name, e),
      }
      results.push((name, result));
    }

    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::PipelineConfig,
    model::{DetectError, DetectItem, DetectResult, RecordDetector},
  };
  use image::{ImageFormat, Rgb, RgbImage};
  use std::{io::Cursor, sync::Arc};

  struct NoOutput;

  #[derive(thiserror::Error, Debug)]
  #[error("不会发生")]
  struct Never;

  impl Publish for NoOutput {
    type Error = Never;

    fn publish(&self, _decision: &DecisionResult) -> Result<(), Never> {
      Ok(())
    }
  }

  fn raw(name: &str) -> RawImage {
    raw_filled(name, Rgb([10, 20, 30]))
  }

  fn raw_filled(name: &str, color: Rgb<u8>) -> RawImage {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::from_pixel(16, 16, color)
      .write_to(&mut buf, ImageFormat::Png)
      .unwrap();
    RawImage {
      name: name.to_string(),
      bytes: buf.into_inner(),
    }
  }

  fn analyzer() -> Analyzer<RecordDetector> {
    let items = vec![
      DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [1.0, 1.0, 8.0, 8.0],
      };
      3
    ];
    Analyzer::new(
      Arc::new(RecordDetector::new(items.into())),
      &PipelineConfig::default(),
    )
  }

  #[test]
  fn one_shot_uses_first_image() {
    let decision = OneShotTask
      .run_task(vec![raw("a"), raw("b")].into_iter(), &analyzer(), NoOutput)
      .unwrap();
    assert_eq!(decision.pedestrian_count, 3);
  }

  #[test]
  fn one_shot_without_input_fails() {
    assert!(
      OneShotTask
        .run_task(std::iter::empty(), &analyzer(), NoOutput)
        .is_err()
    );
  }

  #[test]
  fn repeat_shot_reports_mean() {
    let mean = RepeatShotTask::new(4)
      .run_task(vec![raw("a")].into_iter(), &analyzer(), NoOutput)
      .unwrap();
    assert!(mean > Duration::ZERO);
  }

  #[test]
  fn parallel_keeps_input_order_and_isolates_failures() {
    let mut inputs: Vec<RawImage> = (0..9).map(|i| raw(&format!("img{i}"))).collect();
    inputs[4].bytes.clear();

    let results = ParallelTask::new(3)
      .run_task(inputs.into_iter(), &analyzer(), NoOutput)
      .unwrap();
    assert_eq!(results.len(), 9);
    for (i, (name, result)) in results.iter().enumerate() {
      assert_eq!(name, &format!("img{i}"));
      assert_eq!(result.is_err(), i == 4);
    }
  }

  /// 遇到纯红图像时崩溃
  struct RedPanicDetector;

  impl Detector for RedPanicDetector {
    fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
      if image.get_pixel(0, 0) == &Rgb([255, 0, 0]) {
        panic!("红色图像");
      }
      Ok(DetectResult::default())
    }
  }

  #[test]
  fn parallel_reports_panicking_image_and_keeps_others() {
    let inputs: Vec<RawImage> = (0..6)
      .map(|i| {
        let color = if i == 1 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        raw_filled(&format!("img{i}"), color)
      })
      .collect();
    let analyzer = Analyzer::new(Arc::new(RedPanicDetector), &PipelineConfig::default());

    let results = ParallelTask::new(2)
      .run_task(inputs.into_iter(), &analyzer, NoOutput)
      .unwrap();
    assert_eq!(results.len(), 6);
    for (i, (name, result)) in results.iter().enumerate() {
      assert_eq!(name, &format!("img{i}"));
      if i == 1 {
        match result {
          Err(ImageTaskError::Panicked(message)) => assert_eq!(message, "红色图像"),
          other => panic!("unexpected result: {other:?}"),
        }
      } else {
        assert_eq!(result.as_ref().unwrap().pedestrian_count, 0);
      }
    }
  }
}
