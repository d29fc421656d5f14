// 该文件是 Banma （斑马） 项目的一部分。
// src/priority.rs - 行人计数与信号优先级判定
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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  config::{DEFAULT_PERSON_CLASS_ID, DEFAULT_PRIORITY_THRESHOLD, PipelineConfig},
  model::DetectResult,
};

/// 信号优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityLabel {
  Pedestrians,
  Vehicles,
}

impl PriorityLabel {
  pub fn as_str(&self) -> &'static str {
    match self {
      PriorityLabel::Pedestrians => "PEDESTRIANS",
      PriorityLabel::Vehicles => "VEHICLES",
    }
  }
}

impl fmt::Display for PriorityLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 统计类别为 "person" 的检测数量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedestrianCounter {
  person_class_id: u32,
  min_score: Option<f32>,
}

impl Default for PedestrianCounter {
  fn default() -> Self {
    Self::new(DEFAULT_PERSON_CLASS_ID)
  }
}

impl PedestrianCounter {
  /// 不做置信度过滤，信任检测器自身的阈值
  pub fn new(person_class_id: u32) -> Self {
    Self {
      person_class_id,
      min_score: None,
    }
  }

  /// 额外要求置信度不低于 `min_score`
  pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
    self.min_score = min_score;
    self
  }

  pub fn person_class_id(&self) -> u32 {
    self.person_class_id
  }

  pub fn count(&self, detections: &DetectResult) -> usize {
    detections
      .iter()
      .filter(|item| item.class_id == self.person_class_id)
      .filter(|item| self.min_score.is_none_or(|min| item.score >= min))
      .count()
  }
}

/// 阈值判定: 行人数严格大于阈值时优先行人
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityClassifier {
  threshold: usize,
}

impl Default for PriorityClassifier {
  fn default() -> Self {
    Self::new(DEFAULT_PRIORITY_THRESHOLD)
  }
}

impl PriorityClassifier {
  pub fn new(threshold: usize) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> usize {
    self.threshold
  }

  pub fn classify(&self, pedestrian_count: usize) -> PriorityLabel {
    if pedestrian_count > self.threshold {
      PriorityLabel::Pedestrians
    } else {
      PriorityLabel::Vehicles
    }
  }
}

impl From<&PipelineConfig> for PedestrianCounter {
  fn from(config: &PipelineConfig) -> Self {
    PedestrianCounter::new(config.person_class_id).with_min_score(config.min_score)
  }
}

impl From<&PipelineConfig> for PriorityClassifier {
  fn from(config: &PipelineConfig) -> Self {
    PriorityClassifier::new(config.priority_threshold)
  }
}
