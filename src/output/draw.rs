// 该文件是 Banma （斑马） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::{
  config::{DEFAULT_PERSON_CLASS_ID, RenderConfig},
  model::{DetectItem, DetectResult, label_name},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_PADDING: i32 = 2;
const PERSON_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const PALETTE_SIZE: usize = 80;

/// 在图像上绘制检测框与标签
pub struct Draw {
  font: FontArc,
  font_scale: PxScale,
  line_thickness: u32,
  draw_labels: bool,
  person_class_id: u32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(&RenderConfig::default(), DEFAULT_PERSON_CLASS_ID)
  }
}

impl Draw {
  pub fn new(config: &RenderConfig, person_class_id: u32) -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf"); // default font
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    // 每个类别一个颜色，行人单独使用醒目的红色
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      line_thickness: config.line_thickness.max(1),
      draw_labels: config.draw_labels,
      person_class_id,
      colors,
    }
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    if class_id == self.person_class_id {
      Rgb(PERSON_COLOR)
    } else {
      self.colors[class_id as usize % self.colors.len()]
    }
  }

  /// 绘制全部检测结果，返回绘制的检测框数量
  ///
  /// 边框裁剪到图像范围内；退化的边框（宽或高为 0）仍会画成一条线或一个点，
  /// 保证每个检测都恰好出现一次。
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) -> usize {
    if image.width() == 0 || image.height() == 0 {
      return 0;
    }
    let mut drawn = 0;
    for item in result.iter() {
      if self.draw_bbox_with_label(image, item) {
        drawn += 1;
      }
    }
    drawn
  }

  /// 绘制单个检测，边框左上角确实带有该类别颜色时返回 `true`
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) -> bool {
    let rect = clamp_rect(image, &item.bbox);
    let color = self.color_of(item.class_id);

    // 逐层向内绘制加粗边框
    for inset in 0..self.line_thickness {
      let w = rect.width().saturating_sub(2 * inset);
      let h = rect.height().saturating_sub(2 * inset);
      if w == 0 || h == 0 {
        break;
      }
      let layer = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(w, h);
      draw_hollow_rect_mut(image, layer, color);
    }
    // 标签绘制在框的上方或内侧，必须在检查边框之后
    let drawn = image.get_pixel(rect.left() as u32, rect.top() as u32) == &color;

    if self.draw_labels {
      self.draw_label(image, &rect, item, color);
    }
    drawn
  }

  fn draw_label(&self, image: &mut RgbImage, rect: &Rect, item: &DetectItem, color: Rgb<u8>) {
    let label = format!("{} {:.2}", label_name(item.class_id), item.score);
    let (text_w, text_h) = text_size(self.font_scale, &self.font, &label);
    let label_w = text_w + 2 * LABEL_TEXT_PADDING as u32;
    let label_h = text_h + 2 * LABEL_TEXT_PADDING as u32;

    // 标签优先放在边框上方，空间不足时放在边框内侧
    let label_x = rect.left();
    let label_y = if rect.top() >= label_h as i32 {
      rect.top() - label_h as i32
    } else {
      rect.top()
    };

    let max_width = (image.width() as i32 - label_x).max(0) as u32;
    let label_w = label_w.min(max_width);
    if label_w == 0 {
      return;
    }

    let background = Rect::at(label_x, label_y).of_size(label_w, label_h);
    draw_filled_rect_mut(image, background, color);
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]), // 白色文本
      label_x + LABEL_TEXT_PADDING,
      label_y + LABEL_TEXT_PADDING,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

/// 将像素坐标边框裁剪到图像内，结果至少 1x1
fn clamp_rect(image: &RgbImage, bbox: &[f32; 4]) -> Rect {
  let max_x = image.width() as i32 - 1;
  let max_y = image.height() as i32 - 1;

  let x0 = (bbox[0].min(bbox[2]).floor() as i32).clamp(0, max_x);
  let y0 = (bbox[1].min(bbox[3]).floor() as i32).clamp(0, max_y);
  let x1 = (bbox[0].max(bbox[2]).ceil() as i32).clamp(0, max_x);
  let y1 = (bbox[1].max(bbox[3]).ceil() as i32).clamp(0, max_y);

  Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
