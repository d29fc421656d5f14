// 该文件是 Banma （斑马） 项目的一部分。
// src/pipeline.rs - 解码、检测、计数、判定与渲染流水线
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

use std::{sync::Arc, time::Instant};

use image::RgbImage;
use serde::{Serialize, ser::SerializeStruct};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::PipelineConfig,
  input::{DecodeError, decode_image},
  model::{DetectError, DetectResult, Detector},
  output::{AnnotatedImage, Annotator, EncodeError, Render},
  priority::{PedestrianCounter, PriorityClassifier, PriorityLabel},
};

/// 一次分析的完整结果
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
  pub pedestrian_count: usize,
  pub priority_label: PriorityLabel,
  pub annotated_image: AnnotatedImage,
  pub detections: DetectResult,
}

// 对外形式: 标注图以 base64 字符串内嵌
impl Serialize for DecisionResult {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut state = serializer.serialize_struct("DecisionResult", 5)?;
    state.serialize_field("pedestrian_count", &self.pedestrian_count)?;
    state.serialize_field("priority_label", &self.priority_label)?;
    state.serialize_field("annotated_image", &self.annotated_image.to_base64())?;
    state.serialize_field("image_format", &self.annotated_image.format)?;
    state.serialize_field("detections", &self.detections)?;
    state.end()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Decode,
  Detection,
  Encoding,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("目标检测失败: {0}")]
  Detection(#[from] DetectError),
  /// 计数与判定已经完成，仅标注图编码失败
  #[error("标注图编码失败 (行人数 {pedestrian_count}, 判定 {priority_label}): {source}")]
  Encode {
    source: EncodeError,
    pedestrian_count: usize,
    priority_label: PriorityLabel,
  },
}

impl AnalyzeError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      AnalyzeError::Decode(_) => ErrorKind::Decode,
      AnalyzeError::Detection(_) => ErrorKind::Detection,
      AnalyzeError::Encode { .. } => ErrorKind::Encoding,
    }
  }
}

/// 流水线编排
///
/// 不保存调用之间的状态；检测器通过 `Arc` 共享，可以在多个线程中
/// 同时以引用调用 [`Analyzer::analyze`]。
pub struct Analyzer<D> {
  detector: Arc<D>,
  counter: PedestrianCounter,
  classifier: PriorityClassifier,
  annotator: Annotator,
}

impl<D: Detector> Analyzer<D> {
  pub fn new(detector: Arc<D>, config: &PipelineConfig) -> Self {
    Self {
      detector,
      counter: PedestrianCounter::from(config),
      classifier: PriorityClassifier::from(config),
      annotator: Annotator::from(config),
    }
  }

  pub fn detector(&self) -> &Arc<D> {
    &self.detector
  }

  /// 分析一张已编码的图像 (JPEG/PNG 等)
  pub fn analyze(&self, raw: &[u8]) -> Result<DecisionResult, AnalyzeError> {
    let now = Instant::now();
    let image = decode_image(raw)?;
    debug!(
      "解码完成 {}x{}，耗时: {:.2?}",
      image.width(),
      image.height(),
      now.elapsed()
    );
    self.analyze_image(&image)
  }

  /// 分析一张已解码的图像
  pub fn analyze_image(&self, image: &RgbImage) -> Result<DecisionResult, AnalyzeError> {
    let now = Instant::now();
    let detections = self.detector.detect(image)?;
    let detect_elapsed = now.elapsed();
    debug!("检测到 {} 个物体，耗时: {:.2?}", detections.len(), detect_elapsed);

    let pedestrian_count = self.counter.count(&detections);
    let priority_label = self.classifier.classify(pedestrian_count);

    let annotated_image = self
      .annotator
      .render_result(image, &detections)
      .map_err(|source| AnalyzeError::Encode {
        source,
        pedestrian_count,
        priority_label,
      })?;
    info!(
      "行人数: {}, 判定: {}, 推理耗时: {:.2?}, 总耗时: {:.2?}",
      pedestrian_count,
      priority_label,
      detect_elapsed,
      now.elapsed()
    );

    Ok(DecisionResult {
      pedestrian_count,
      priority_label,
      annotated_image,
      detections,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::RenderConfig,
    model::{DetectItem, RecordDetector},
    output::EncodeFormat,
  };
  use image::{ImageFormat, Rgb};
  use std::io::Cursor;

  fn item(class_id: u32) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.7,
      bbox: [2.0, 2.0, 20.0, 20.0],
    }
  }

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([90, 120, 150]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
  }

  fn analyzer(items: Vec<DetectItem>) -> Analyzer<RecordDetector> {
    Analyzer::new(
      Arc::new(RecordDetector::new(items.into())),
      &PipelineConfig::default(),
    )
  }

  struct FailingDetector;

  impl Detector for FailingDetector {
    fn detect(&self, _image: &RgbImage) -> Result<DetectResult, DetectError> {
      Err(DetectError::InferenceError("设备忙".to_string()))
    }
  }

  #[test]
  fn analyzer_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Analyzer<RecordDetector>>();
    assert_send_sync::<Analyzer<crate::model::LazyDetector<RecordDetector>>>();
  }

  #[test]
  fn counts_classifies_and_annotates() {
    let analyzer = analyzer(vec![item(0); 6]);
    let decision = analyzer.analyze(&png_bytes(64, 48)).unwrap();
    assert_eq!(decision.pedestrian_count, 6);
    assert_eq!(decision.priority_label, PriorityLabel::Pedestrians);
    assert_eq!(decision.annotated_image.boxes, 6);
    assert_eq!(decision.annotated_image.format, EncodeFormat::Jpeg);
    assert_eq!(
      (decision.annotated_image.width, decision.annotated_image.height),
      (64, 48)
    );
  }

  #[test]
  fn empty_bytes_are_a_decode_error() {
    let err = analyzer(vec![]).analyze(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
  }

  #[test]
  fn detector_failure_is_propagated() {
    let analyzer = Analyzer::new(Arc::new(FailingDetector), &PipelineConfig::default());
    let err = analyzer.analyze(&png_bytes(8, 8)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Detection);
    assert!(matches!(
      err,
      AnalyzeError::Detection(DetectError::InferenceError(_))
    ));
  }

  #[test]
  fn encode_failure_keeps_count_and_label() {
    let analyzer = analyzer(vec![item(0); 7]);
    let err = analyzer.analyze_image(&RgbImage::new(0, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    match err {
      AnalyzeError::Encode {
        pedestrian_count,
        priority_label,
        ..
      } => {
        assert_eq!(pedestrian_count, 7);
        assert_eq!(priority_label, PriorityLabel::Pedestrians);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn decision_serializes_flat() {
    let config = PipelineConfig {
      render: RenderConfig {
        format: EncodeFormat::Png,
        ..Default::default()
      },
      ..Default::default()
    };
    let analyzer = Analyzer::new(
      Arc::new(RecordDetector::new(vec![item(0), item(2)].into())),
      &config,
    );
    let decision = analyzer.analyze(&png_bytes(16, 16)).unwrap();
    let json = serde_json::to_value(&decision).unwrap();

    assert_eq!(json["pedestrian_count"], 1);
    assert_eq!(json["priority_label"], "VEHICLES");
    assert_eq!(json["image_format"], "png");
    assert_eq!(json["detections"].as_array().unwrap().len(), 2);
    assert_eq!(
      json["annotated_image"].as_str().unwrap(),
      decision.annotated_image.to_base64()
    );
  }
}
