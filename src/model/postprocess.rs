// 该文件是 Banma （斑马） 项目的一部分。
// src/model/postprocess.rs - YOLOv8 输出解码与非极大值抑制
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

use tracing::debug;

use crate::{
  frame::Letterbox,
  model::{DetectError, DetectItem, DetectResult},
};

const CXYWH_OFFSET: usize = 4;

/// 检测头输出的解码参数
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
  /// 置信度阈值，检测器内部使用
  pub confidence: f32,
  /// NMS IoU 阈值
  pub iou: f32,
}

/// 解码形如 `[1, 4 + nc, N]` 的 YOLOv8 输出
///
/// 每一列为一个候选框: `cx, cy, w, h, score_0 .. score_{nc-1}`，坐标位于
/// letterbox 之后的模型输入坐标系中。
pub fn decode_yolov8(
  shape: &[usize],
  data: &[f32],
  params: DecodeParams,
  letterbox: &Letterbox,
) -> Result<DetectResult, DetectError> {
  let (rows, anchors) = match shape {
    [1, rows, anchors] => (*rows, *anchors),
    _ => {
      return Err(DetectError::InvalidOutput(format!(
        "预期输出形状为 [1, 4 + nc, N], 实际为 {:?}",
        shape
      )));
    }
  };

  if rows <= CXYWH_OFFSET {
    return Err(DetectError::InvalidOutput(format!(
      "输出行数 {} 不足以包含类别分数",
      rows
    )));
  }
  if data.len() != rows * anchors {
    return Err(DetectError::InvalidOutput(format!(
      "输出长度 {} 与形状 {:?} 不符",
      data.len(),
      shape
    )));
  }

  let num_classes = rows - CXYWH_OFFSET;
  let mut candidates = Vec::new();

  for i in 0..anchors {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c, data[(CXYWH_OFFSET + c) * anchors + i]))
      .fold((0usize, f32::MIN), |best, x| if x.1 > best.1 { x } else { best });

    if score < params.confidence {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];

    candidates.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: letterbox.restore([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]),
    });
  }

  debug!("置信度过滤后候选框数量: {}", candidates.len());
  let items = nms(candidates, params.iou);
  debug!("NMS 后检测数量: {}", items.len());

  Ok(items.into())
}

/// 按类别的非极大值抑制
pub fn nms(mut detections: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut keep: Vec<DetectItem> = Vec::with_capacity(detections.len());
  for det in detections {
    let suppressed = keep
      .iter()
      .any(|k| k.class_id == det.class_id && iou(&k.bbox, &det.bbox) >= iou_threshold);
    if !suppressed {
      keep.push(det);
    }
  }
  keep
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PARAMS: DecodeParams = DecodeParams {
    confidence: 0.25,
    iou: 0.45,
  };

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  /// 以列为候选框构造 `[1, 4 + nc, N]` 输出
  fn columns(num_classes: usize, anchors: &[([f32; 4], Vec<f32>)]) -> (Vec<usize>, Vec<f32>) {
    let rows = 4 + num_classes;
    let n = anchors.len();
    let mut data = vec![0.0; rows * n];
    for (i, (cxywh, scores)) in anchors.iter().enumerate() {
      for (r, v) in cxywh.iter().chain(scores.iter()).enumerate() {
        data[r * n + i] = *v;
      }
    }
    (vec![1, rows, n], data)
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn nms_only_suppresses_within_a_class() {
    let kept = nms(
      vec![
        item(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
        item(2, 0.8, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.7, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 3);
    assert_eq!(kept[0].score, 0.9);
    assert!(kept.iter().any(|d| d.class_id == 2));
    assert!(kept.iter().all(|d| d.score != 0.6));
  }

  #[test]
  fn decodes_and_restores_boxes() {
    let letterbox = Letterbox::new(640, 640, 640);
    let (shape, data) = columns(
      3,
      &[
        ([100.0, 100.0, 20.0, 40.0], vec![0.9, 0.1, 0.0]),
        ([300.0, 300.0, 50.0, 50.0], vec![0.1, 0.2, 0.8]),
        ([500.0, 500.0, 10.0, 10.0], vec![0.1, 0.1, 0.1]),
      ],
    );

    let result = decode_yolov8(&shape, &data, PARAMS, &letterbox).unwrap();
    assert_eq!(result.len(), 2);
    let person = result.iter().find(|d| d.class_id == 0).unwrap();
    assert_eq!(person.bbox, [90.0, 80.0, 110.0, 120.0]);
    let other = result.iter().find(|d| d.class_id == 2).unwrap();
    assert_eq!(other.score, 0.8);
  }

  #[test]
  fn empty_output_is_not_an_error() {
    let letterbox = Letterbox::new(320, 240, 640);
    let (shape, data) = columns(2, &[([10.0, 10.0, 5.0, 5.0], vec![0.01, 0.02])]);
    let result = decode_yolov8(&shape, &data, PARAMS, &letterbox).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn malformed_output_is_an_error() {
    let letterbox = Letterbox::new(640, 640, 640);
    assert!(matches!(
      decode_yolov8(&[1, 84], &[0.0; 84], PARAMS, &letterbox),
      Err(DetectError::InvalidOutput(_))
    ));
    assert!(matches!(
      decode_yolov8(&[1, 4, 2], &[0.0; 8], PARAMS, &letterbox),
      Err(DetectError::InvalidOutput(_))
    ));
    assert!(matches!(
      decode_yolov8(&[1, 6, 2], &[0.0; 10], PARAMS, &letterbox),
      Err(DetectError::InvalidOutput(_))
    ));
  }
}
