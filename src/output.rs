// 该文件是 Banma （斑马） 项目的一部分。
// src/output.rs - 输出定义
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

use base64::{Engine, engine::general_purpose::STANDARD};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl,
  config::PipelineConfig,
  model::DetectResult,
  pipeline::DecisionResult,
};
#[cfg(any(feature = "save_image_file", feature = "decision_record"))]
use crate::FromUrlWithScheme;

/// 把检测结果渲染到一帧图像上
pub trait Render<Frame, Output> {
  type Rendered;
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<Self::Rendered, Self::Error>;
}

/// 发布一次完整的决策
pub trait Publish {
  type Error;
  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error>;
}

/// 依次发布到多个输出，遇到第一个错误即停止
impl<P: Publish> Publish for [P] {
  type Error = P::Error;

  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error> {
    self.iter().try_for_each(|output| output.publish(decision))
  }
}

impl<P: Publish> Publish for Vec<P> {
  type Error = P::Error;

  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error> {
    self.as_slice().publish(decision)
  }
}

pub mod draw;

mod encode;
pub use self::encode::{EncodeError, EncodeFormat, ImageEncoder};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "decision_record")]
mod decision_record;
#[cfg(feature = "decision_record")]
pub use self::decision_record::{DecisionRecordError, DecisionRecordOutput};

/// 编码后的标注图
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedImage {
  pub bytes: Vec<u8>,
  pub format: EncodeFormat,
  pub width: u32,
  pub height: u32,
  /// 绘制的检测框数量，总是等于检测结果数量
  pub boxes: usize,
}

impl AnnotatedImage {
  pub fn to_base64(&self) -> String {
    STANDARD.encode(&self.bytes)
  }

  /// 供网页直接嵌入的 data URI
  pub fn to_data_uri(&self) -> String {
    format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
  }
}

/// 绘制检测框并编码为传输格式
pub struct Annotator {
  draw: draw::Draw,
  encoder: ImageEncoder,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::from(&PipelineConfig::default())
  }
}

impl From<&PipelineConfig> for Annotator {
  fn from(config: &PipelineConfig) -> Self {
    Self {
      draw: draw::Draw::new(&config.render, config.person_class_id),
      encoder: ImageEncoder::from(&config.render),
    }
  }
}

impl Annotator {
  pub fn format(&self) -> EncodeFormat {
    self.encoder.format()
  }
}

impl Render<RgbImage, DetectResult> for Annotator {
  type Rendered = AnnotatedImage;
  type Error = EncodeError;

  fn render_result(
    &self,
    frame: &RgbImage,
    result: &DetectResult,
  ) -> Result<AnnotatedImage, EncodeError> {
    let mut canvas = frame.clone();
    let boxes = self.draw.draw_detections_on_image(&mut canvas, result);
    let bytes = self.encoder.encode(&canvas)?;
    debug!(
      "绘制 {} 个检测框，编码为 {:?}，{} 字节",
      boxes,
      self.encoder.format(),
      bytes.len()
    );

    Ok(AnnotatedImage {
      bytes,
      format: self.encoder.format(),
      width: canvas.width(),
      height: canvas.height(),
      boxes,
    })
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "decision_record")]
  #[error("决策记录输出错误: {0}")]
  DecisionRecordError(#[from] DecisionRecordError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "decision_record")]
  DecisionRecordOutput(DecisionRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "decision_record")]
      DecisionRecordOutput::SCHEME => {
        let output = DecisionRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DecisionRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Publish for OutputWrapper {
  type Error = OutputError;

  fn publish(&self, decision: &DecisionResult) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.publish(decision).map_err(OutputError::from)
      }
      #[cfg(feature = "decision_record")]
      OutputWrapper::DecisionRecordOutput(output) => {
        output.publish(decision).map_err(OutputError::from)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::RenderConfig,
    model::DetectItem,
  };
  use image::Rgb;

  fn png_config() -> PipelineConfig {
    PipelineConfig {
      render: RenderConfig {
        format: EncodeFormat::Png,
        ..Default::default()
      },
      ..Default::default()
    }
  }

  #[test]
  fn every_detection_is_drawn_once() {
    let annotator = Annotator::from(&png_config());
    let frame = RgbImage::from_pixel(200, 150, Rgb([30, 30, 30]));
    let result: DetectResult = (0..50)
      .map(|i| DetectItem {
        class_id: (i % 3) as u32,
        score: 0.5,
        bbox: [i as f32 * 4.0, 10.0, i as f32 * 4.0 + 30.0, 140.0],
      })
      .collect();

    let annotated = annotator.render_result(&frame, &result).unwrap();
    assert_eq!(annotated.boxes, 50);
    assert_eq!((annotated.width, annotated.height), (200, 150));
  }

  #[test]
  fn empty_result_leaves_content_unchanged() {
    let annotator = Annotator::from(&png_config());
    let frame = RgbImage::from_fn(32, 24, |x, y| Rgb([x as u8, y as u8, 7]));

    let annotated = annotator
      .render_result(&frame, &DetectResult::default())
      .unwrap();
    assert_eq!(annotated.boxes, 0);
    let decoded = image::load_from_memory(&annotated.bytes).unwrap().to_rgb8();
    assert_eq!(decoded, frame);
  }

  #[test]
  fn render_does_not_touch_input_frame() {
    let annotator = Annotator::default();
    let frame = RgbImage::new(40, 40);
    let result: DetectResult = vec![DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: [5.0, 5.0, 30.0, 30.0],
    }]
    .into();
    annotator.render_result(&frame, &result).unwrap();
    assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn zero_sized_frame_is_an_encode_error() {
    let annotator = Annotator::default();
    assert!(matches!(
      annotator.render_result(&RgbImage::new(0, 0), &DetectResult::default()),
      Err(EncodeError::EmptyImage { .. })
    ));
  }

  #[test]
  fn data_uri_carries_mime_type() {
    let image = AnnotatedImage {
      bytes: vec![1, 2, 3],
      format: EncodeFormat::Jpeg,
      width: 1,
      height: 1,
      boxes: 0,
    };
    assert_eq!(image.to_base64(), "AQID");
    assert_eq!(image.to_data_uri(), "data:image/jpeg;base64,AQID");
  }

  #[test]
  fn unknown_output_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
