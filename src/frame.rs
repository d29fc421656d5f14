// 该文件是 Banma （斑马） 项目的一部分。
// src/frame.rs - 模型输入张量
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

use std::str::FromStr;

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// 模型期望的通道顺序，解码后的图像始终是 RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl FromStr for ChannelOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      other => Err(format!("未知的通道顺序: {}", other)),
    }
  }
}

impl ChannelOrder {
  /// 目标张量第 `c` 个平面对应的 RGB 像素分量
  fn source_channel(self, c: usize) -> usize {
    match self {
      ChannelOrder::Rgb => c,
      ChannelOrder::Bgr => RGB_CHANNELS - 1 - c,
    }
  }
}

/// 保持宽高比缩放并居中填充时的几何参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub original_width: u32,
  pub original_height: u32,
}

impl Letterbox {
  pub fn new(original_width: u32, original_height: u32, target: u32) -> Self {
    let target_f = target as f32;
    let scale = (target_f / original_width as f32).min(target_f / original_height as f32);
    let scaled_w = (original_width as f32 * scale).round();
    let scaled_h = (original_height as f32 * scale).round();

    Self {
      scale,
      pad_x: ((target_f - scaled_w) / 2.0).floor(),
      pad_y: ((target_f - scaled_h) / 2.0).floor(),
      original_width,
      original_height,
    }
  }

  fn scaled_size(&self) -> (u32, u32) {
    (
      ((self.original_width as f32 * self.scale).round() as u32).max(1),
      ((self.original_height as f32 * self.scale).round() as u32).max(1),
    )
  }

  /// 将模型坐标系中的 [x_min, y_min, x_max, y_max] 还原到原图像素坐标并裁剪到图像范围
  pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.original_width as f32;
    let h = self.original_height as f32;
    [
      ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
    ]
  }
}

/// NCHW 布局、归一化到 [0, 1] 的单张图像输入张量
#[derive(Debug, Clone)]
pub struct NchwTensor {
  data: Box<[f32]>,
  size: u32,
}

impl NchwTensor {
  /// 对原图做 letterbox 并按指定通道顺序展开为 NCHW
  pub fn letterbox(image: &RgbImage, size: u32, order: ChannelOrder) -> (Self, Letterbox) {
    let letterbox = Letterbox::new(image.width(), image.height(), size);
    let (scaled_w, scaled_h) = letterbox.scaled_size();
    let resized = image::imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

    let side = size as usize;
    let plane = side * side;
    let mut data = vec![LETTERBOX_FILL; RGB_CHANNELS * plane];

    let pad_x = letterbox.pad_x as usize;
    let pad_y = letterbox.pad_y as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
      let dst_x = x as usize + pad_x;
      let dst_y = y as usize + pad_y;
      if dst_x >= side || dst_y >= side {
        continue;
      }
      let idx = dst_y * side + dst_x;
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[order.source_channel(c)] as f32 / 255.0;
      }
    }

    (
      Self {
        data: data.into_boxed_slice(),
        size,
      },
      letterbox,
    )
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.size as usize, self.size as usize]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn into_boxed_slice(self) -> Box<[f32]> {
    self.data
  }
}
