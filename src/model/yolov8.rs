// 该文件是 Banma （斑马） 项目的一部分。
// src/model/yolov8.rs - 基于 ONNX Runtime 的 YOLOv8 检测器
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

use std::sync::{Mutex, PoisonError};

use image::RgbImage;
use ort::session::{Session, builder::GraphOptimizationLevel};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ChannelOrder, NchwTensor},
  model::{
    DetectError, DetectResult, Detector,
    postprocess::{DecodeParams, decode_yolov8},
  },
  query_param,
};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_CONF_THRESH: f32 = 0.25;
const YOLOV8_IOU_THRESH: f32 = 0.45;
const YOLOV8_INTRA_THREADS: usize = 4;

/// YOLOv8 ONNX 模型
///
/// ONNX Runtime 会话推理时需要独占访问，这里用互斥锁串行化推理；
/// 预处理与后处理在锁外进行。
pub struct Yolov8 {
  session: Mutex<Session>,
  input_name: String,
  input_size: u32,
  order: ChannelOrder,
  params: DecodeParams,
}

/// 由 `onnx:///path/model.onnx?conf=0.25&iou=0.45&size=640&order=rgb&threads=4` 构建
pub struct Yolov8Builder {
  model_path: String,
  input_size: u32,
  order: ChannelOrder,
  params: DecodeParams,
  intra_threads: usize,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for Yolov8Builder {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let bad = DetectError::ModelPathError;
    let defaults = Yolov8Builder::new(url.path());
    Ok(Yolov8Builder {
      input_size: query_param(url, "size")
        .map_err(bad)?
        .unwrap_or(defaults.input_size),
      order: query_param(url, "order")
        .map_err(bad)?
        .unwrap_or(defaults.order),
      params: DecodeParams {
        confidence: query_param(url, "conf")
          .map_err(bad)?
          .unwrap_or(defaults.params.confidence),
        iou: query_param(url, "iou")
          .map_err(bad)?
          .unwrap_or(defaults.params.iou),
      },
      intra_threads: query_param(url, "threads")
        .map_err(bad)?
        .unwrap_or(defaults.intra_threads),
      ..defaults
    })
  }
}

impl Yolov8Builder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: YOLOV8_INPUT_SIZE,
      order: ChannelOrder::default(),
      params: DecodeParams {
        confidence: YOLOV8_CONF_THRESH,
        iou: YOLOV8_IOU_THRESH,
      },
      intra_threads: YOLOV8_INTRA_THREADS,
    }
  }

  pub fn build(self) -> Result<Yolov8, DetectError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()
      .map_err(load_error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(load_error)?
      .with_intra_threads(self.intra_threads)
      .map_err(load_error)?
      .commit_from_file(&self.model_path)
      .map_err(load_error)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| DetectError::ModelLoadError("模型没有输入".to_string()))?;
    if session.outputs.is_empty() {
      return Err(DetectError::ModelLoadError("模型没有输出".to_string()));
    }
    debug!("模型输入: {}, 输出数量: {}", input_name, session.outputs.len());
    info!("模型加载完成");

    Ok(Yolov8 {
      session: Mutex::new(session),
      input_name,
      input_size: self.input_size,
      order: self.order,
      params: self.params,
    })
  }
}

fn load_error(e: impl std::fmt::Display) -> DetectError {
  DetectError::ModelLoadError(e.to_string())
}

fn inference_error(e: impl std::fmt::Display) -> DetectError {
  DetectError::InferenceError(e.to_string())
}

impl Yolov8 {
  fn infer(&self, tensor: NchwTensor) -> Result<(Vec<usize>, Vec<f32>), DetectError> {
    let shape = tensor.shape();
    let input_value = ort::value::Value::from_array((shape.as_slice(), tensor.into_boxed_slice()))
      .map_err(inference_error)?;

    // 会话本身不保存单次调用的状态，锁中毒后可以继续使用
    let mut session = self.session.lock().unwrap_or_else(|poisoned| {
      warn!("推理锁已中毒，恢复使用");
      PoisonError::into_inner(poisoned)
    });

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => input_value])
      .map_err(inference_error)?;

    let (output_shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(inference_error)?;
    let output_shape: Vec<usize> = output_shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok((output_shape, data.to_vec()))
  }
}

impl Detector for Yolov8 {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    let now = std::time::Instant::now();
    let (tensor, letterbox) = NchwTensor::letterbox(image, self.input_size, self.order);
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    let (shape, data) = self.infer(tensor)?;
    debug!("推理完成，输出形状 {:?}，耗时: {:.2?}", shape, now.elapsed());

    let result = decode_yolov8(&shape, &data, self.params, &letterbox)?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_reads_query_parameters() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?conf=0.4&iou=0.5&size=320&order=bgr").unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/yolov8n.onnx");
    assert_eq!(builder.input_size, 320);
    assert_eq!(builder.order, ChannelOrder::Bgr);
    assert_eq!(builder.params.confidence, 0.4);
    assert_eq!(builder.params.iou, 0.5);
  }

  #[test]
  fn builder_falls_back_to_defaults() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?iou=0.6").unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.input_size, YOLOV8_INPUT_SIZE);
    assert_eq!(builder.order, ChannelOrder::Rgb);
    assert_eq!(builder.params.confidence, YOLOV8_CONF_THRESH);
    assert_eq!(builder.params.iou, 0.6);
    assert_eq!(builder.intra_threads, YOLOV8_INTRA_THREADS);
  }

  #[test]
  fn builder_rejects_bad_parameters() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?conf=high").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url),
      Err(DetectError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_model_file_is_a_load_error() {
    let result = Yolov8Builder::new("/nonexistent/yolov8n.onnx").build();
    assert!(matches!(result, Err(DetectError::ModelLoadError(_))));
  }
}
