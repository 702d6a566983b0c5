// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::{
  frame::Frame,
  model::{DetectResult, Detection},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_PADDING: i32 = 3;
const LABEL_BAR_HEIGHT: u32 = 4; // 无字体时只画色条
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [0, 0, 0];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("读取字体文件失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  box_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)?;
    Ok(Self {
      font: Some(font),
      ..Default::default()
    })
  }

  /// 复制帧并绘制检测框；`result` 为 `None` 时返回未标注的副本
  pub fn draw_detection(&self, frame: &Frame, result: Option<&DetectResult>) -> RgbImage {
    let mut image = frame.to_rgb_image();
    if let Some(result) = result {
      for item in result.items.iter() {
        self.draw_bbox_with_label(&mut image, item);
      }
    }
    image
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (item.bbox.x_min.floor() as i32).clamp(0, w - 1);
    let y_min = (item.bbox.y_min.floor() as i32).clamp(0, h - 1);
    let x_max = (item.bbox.x_max.ceil() as i32).clamp(0, w - 1);
    let y_max = (item.bbox.y_max.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.box_color);
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("{} {:.2}", item.label(), item.confidence);
    match self.font {
      Some(ref font) => {
        let scale = PxScale::from(self.font_size);
        let (text_w, text_h) = text_size(scale, font, &label);
        let bg_w = text_w + 2 * LABEL_TEXT_PADDING as u32;
        let bg_h = text_h + 2 * LABEL_TEXT_PADDING as u32;
        let label_y = (y_min - bg_h as i32).max(0);
        let bg_w = bg_w.min((w - x_min) as u32);
        draw_filled_rect_mut(image, Rect::at(x_min, label_y).of_size(bg_w, bg_h), color);
        draw_text_mut(
          image,
          Rgb(TEXT_COLOR),
          x_min + LABEL_TEXT_PADDING,
          label_y + LABEL_TEXT_PADDING,
          scale,
          font,
          &label,
        );
      }
      None => {
        let bar_w = (x_max - x_min) as u32;
        let bar_y = (y_min - LABEL_BAR_HEIGHT as i32).max(0);
        draw_filled_rect_mut(image, Rect::at(x_min, bar_y).of_size(bar_w, LABEL_BAR_HEIGHT), color);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::PixelFormat, model::BoundingBox};

  #[test]
  fn draws_box_outline_only_when_annotated() {
    let frame = Frame::filled(0, 32, 32, PixelFormat::Rgb, [0, 0, 0]);
    let result = DetectResult::from(vec![Detection {
      bbox: BoundingBox::new(8.0, 10.0, 20.0, 24.0),
      confidence: 0.9,
      class_id: 2,
    }]);
    let draw = Draw::default();

    let plain = draw.draw_detection(&frame, None);
    assert!(plain.pixels().all(|p| p.0 == [0, 0, 0]));

    let image = draw.draw_detection(&frame, Some(&result));
    assert_eq!(image.get_pixel(8, 15).0, BOX_COLOR);
    assert_eq!(image.get_pixel(9, 15).0, BOX_COLOR);
    // 框内部保持原样
    assert_eq!(image.get_pixel(14, 17).0, [0, 0, 0]);
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::with_font_file(Path::new("/nonexistent/font.ttf")),
      Err(DrawError::IoError(_))
    ));
  }
}
