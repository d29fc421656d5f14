// 该文件是 Banma （斑马） 项目的一部分。
// src/model.rs - 检测模型
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
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

pub fn label_name(class_id: u32) -> &'static str {
  COCO_CLASSES
    .get(class_id as usize)
    .copied()
    .unwrap_or("unknown")
}

/// 单个检测结果，坐标为原图像素坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

/// 一张图像的全部检测结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl FromIterator<DetectItem> for DetectResult {
  fn from_iter<I: IntoIterator<Item = DetectItem>>(iter: I) -> Self {
    iter.into_iter().collect::<Vec<_>>().into()
  }
}

/// 检测失败。空结果表示“没有检测到物体”，从不表示检测器出错
#[derive(Error, Debug, Clone)]
pub enum DetectError {
  #[error("检测器不可用: {0}")]
  Unavailable(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 外部检测能力
///
/// 输入为解码后的 RGB 图像；若模型需要其他通道顺序，由实现者在推理前转换。
/// 实现必须可以在线程间共享，若底层推理不支持并发，需在内部串行化。
pub trait Detector: Send + Sync {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Arc<D> {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    (**self).detect(image)
  }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    (**self).detect(image)
  }
}

mod lazy;
pub use self::lazy::LazyDetector;

pub mod postprocess;

mod record;
pub use self::record::RecordDetector;

#[cfg(feature = "model_yolov8")]
mod yolov8;
#[cfg(feature = "model_yolov8")]
pub use self::yolov8::{Yolov8, Yolov8Builder};

/// 按 URL 方案选择检测器
pub enum DetectorWrapper {
  Record(RecordDetector),
  #[cfg(feature = "model_yolov8")]
  Yolov8(Yolov8),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      RecordDetector::SCHEME => Ok(DetectorWrapper::Record(RecordDetector::from_url(url)?)),
      #[cfg(feature = "model_yolov8")]
      Yolov8Builder::SCHEME => Ok(DetectorWrapper::Yolov8(
        Yolov8Builder::from_url(url)?.build()?,
      )),
      other => Err(DetectError::ModelPathError(format!(
        "不支持的模型方案: {}",
        other
      ))),
    }
  }
}

impl Detector for DetectorWrapper {
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, DetectError> {
    match self {
      DetectorWrapper::Record(detector) => detector.detect(image),
      #[cfg(feature = "model_yolov8")]
      DetectorWrapper::Yolov8(detector) => detector.detect(image),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_names_follow_coco() {
    assert_eq!(label_name(0), "person");
    assert_eq!(label_name(2), "car");
    assert_eq!(label_name(7), "truck");
    assert_eq!(label_name(80), "unknown");
  }

  #[test]
  fn detect_result_serializes_as_list() {
    let result: DetectResult = vec![DetectItem {
      class_id: 0,
      score: 0.5,
      bbox: [1.0, 2.0, 3.0, 4.0],
    }]
    .into();
    let json = serde_json::to_string(&result).unwrap();
    assert_eq!(
      json,
      r#"[{"class_id":0,"score":0.5,"bbox":[1.0,2.0,3.0,4.0]}]"#
    );
    let back: DetectResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("tflite:///models/yolo.tflite").unwrap();
    assert!(matches!(
      DetectorWrapper::from_url(&url),
      Err(DetectError::ModelPathError(_))
    ));
  }
}
