// 该文件是 Banma （斑马） 项目的一部分。
// src/model/lazy.rs - 延迟加载的共享检测器
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

use image::RgbImage;
use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::model::{DetectError, DetectResult, Detector};

type Loader<D> = Box<dyn Fn() -> Result<D, DetectError> + Send + Sync>;

/// 首次使用时加载模型，之后所有调用共享同一个只读实例
///
/// 加载失败不会被缓存，下一次调用会重新尝试加载。
pub struct LazyDetector<D> {
  cell: OnceCell<Arc<D>>,
  loader: Loader<D>,
}

impl<D: Detector> LazyDetector<D> {
  pub fn new<F>(loader: F) -> Self
  where
    F: Fn() -> Result<D, DetectError> + Send + Sync + 'static,
  {
    Self {
      cell: OnceCell::new(),
      loader: Box::new(loader),
    }
  }

  /// 获取已加载的模型，必要时加载
  pub fn get(&self) -> Result<&Arc<D>, DetectError> {
    self.cell.get_or_try_init(|| {
      info!("首次使用，加载检测模型");
      let now = std::time::Instant::now();
      match (self.loader)() {
        Ok(detector) => {
          info!("检测模型加载完成，耗时: {:.2?}", now.elapsed());
          Ok(Arc::new(detector))
        }
        Err(e) => {
          error!("检测模型加载失败: {}", e);
          Err(DetectError::Unavailable(e.to_string()))
        }
      }
    })
  }

  pub fn is_loaded(&self) -> bool {
    self.cell.get().is_some()
  }
}

impl<D: Detector> Detector for LazyDetector<D> {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    self.get()?.detect(image)
  }
}
