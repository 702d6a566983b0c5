// 该文件是 Shanan （山南西风） 项目的一部分。
// src/preprocess.rs - 信箱缩放（letterbox）预处理
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

use image::imageops::{self, FilterType};
use ndarray::Array4;
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{Frame, PixelFormat},
  model::ModelInput,
};

/// 填充用的中灰色
pub const LETTERBOX_PAD_VALUE: u8 = 114;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入帧为空: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidTarget { width: u32, height: u32 },
}

/// 缩放与填充参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricTransform {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
}

impl GeometricTransform {
  /// 模型输入坐标 -> 原图坐标
  pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
    (
      (x - self.pad_x as f32) / self.scale,
      (y - self.pad_y as f32) / self.scale,
    )
  }

  /// 原图坐标 -> 模型输入坐标
  pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
    (
      x * self.scale + self.pad_x as f32,
      y * self.scale + self.pad_y as f32,
    )
  }
}

/// 保持宽高比缩放并居中填充到固定尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub target_width: u32,
  pub target_height: u32,
  /// 模型期望的通道顺序
  pub channel_order: PixelFormat,
}

impl Default for Letterbox {
  fn default() -> Self {
    Self {
      target_width: 640,
      target_height: 640,
      channel_order: PixelFormat::Rgb,
    }
  }
}

impl Letterbox {
  pub fn new(target_width: u32, target_height: u32) -> Self {
    Self {
      target_width,
      target_height,
      ..Default::default()
    }
  }

  pub fn with_channel_order(mut self, channel_order: PixelFormat) -> Self {
    self.channel_order = channel_order;
    self
  }

  /// 计算 (scale, 缩放后宽, 缩放后高) 以及填充偏移
  pub fn transform_for(&self, width: u32, height: u32) -> Result<(GeometricTransform, u32, u32), PreprocessError> {
    if width == 0 || height == 0 {
      return Err(PreprocessError::EmptyFrame { width, height });
    }
    if self.target_width == 0 || self.target_height == 0 {
      return Err(PreprocessError::InvalidTarget {
        width: self.target_width,
        height: self.target_height,
      });
    }

    let scale = (self.target_width as f32 / width as f32).min(self.target_height as f32 / height as f32);
    let scaled_w = ((width as f32 * scale) as u32).clamp(1, self.target_width);
    let scaled_h = ((height as f32 * scale) as u32).clamp(1, self.target_height);
    let transform = GeometricTransform {
      scale,
      pad_x: (self.target_width - scaled_w) / 2,
      pad_y: (self.target_height - scaled_h) / 2,
    };

    Ok((transform, scaled_w, scaled_h))
  }

  /// 生成 (1, 3, H, W) 的归一化张量以及逆映射参数
  pub fn apply(&self, frame: &Frame) -> Result<(ModelInput, GeometricTransform), PreprocessError> {
    let (transform, scaled_w, scaled_h) = self.transform_for(frame.width(), frame.height())?;
    debug!(
      "信箱缩放: {}x{} -> {}x{}，偏移 ({}, {})",
      frame.width(),
      frame.height(),
      scaled_w,
      scaled_h,
      transform.pad_x,
      transform.pad_y
    );

    let resized = imageops::resize(&frame.to_rgb_image(), scaled_w, scaled_h, FilterType::Triangle);

    let (tw, th) = (self.target_width as usize, self.target_height as usize);
    let mut tensor = Array4::<f32>::from_elem((1, 3, th, tw), LETTERBOX_PAD_VALUE as f32 / 255.0);

    // to_rgb_image 已统一为 RGB，这里再按模型要求调整通道顺序
    let order: [usize; 3] = match self.channel_order {
      PixelFormat::Rgb => [0, 1, 2],
      PixelFormat::Bgr => [2, 1, 0],
    };

    let (ox, oy) = (transform.pad_x as usize, transform.pad_y as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
      let (tx, ty) = (ox + x as usize, oy + y as usize);
      for (plane, &src) in order.iter().enumerate() {
        tensor[[0, plane, ty, tx]] = pixel[src] as f32 / 255.0;
      }
    }

    Ok((tensor, transform))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_frame_is_padded_vertically() {
    let letterbox = Letterbox::new(640, 640);
    let (transform, w, h) = letterbox.transform_for(1280, 720).unwrap();
    assert!((transform.scale - 0.5).abs() < 1e-6);
    assert_eq!((w, h), (640, 360));
    assert_eq!((transform.pad_x, transform.pad_y), (0, 140));
  }

  #[test]
  fn tall_frame_is_padded_horizontally() {
    let letterbox = Letterbox::new(640, 640);
    let (transform, w, h) = letterbox.transform_for(160, 320).unwrap();
    assert!((transform.scale - 2.0).abs() < 1e-6);
    assert_eq!((w, h), (320, 640));
    assert_eq!((transform.pad_x, transform.pad_y), (160, 0));
  }

  #[test]
  fn inverse_mapping_recovers_original_coordinates() {
    let letterbox = Letterbox::new(640, 640);
    for &(w, h) in &[(1280u32, 720u32), (333, 777), (640, 640), (50, 20), (1920, 1080)] {
      let (transform, _, _) = letterbox.transform_for(w, h).unwrap();
      for &(x, y) in &[(0.0f32, 0.0f32), (w as f32 / 3.0, h as f32 / 2.0), (w as f32, h as f32)] {
        let (mx, my) = transform.to_model(x, y);
        let (rx, ry) = transform.to_original(mx, my);
        assert!((rx - x).abs() < 1e-3, "{}x{}: x {} -> {}", w, h, x, rx);
        assert!((ry - y).abs() < 1e-3, "{}x{}: y {} -> {}", w, h, y, ry);
      }
    }
  }

  #[test]
  fn tensor_has_gray_padding_and_normalized_content() {
    let frame = Frame::filled(0, 8, 4, PixelFormat::Rgb, [255, 0, 0]);
    let letterbox = Letterbox::new(8, 8);
    let (tensor, transform) = letterbox.apply(&frame).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    assert_eq!((transform.pad_x, transform.pad_y), (0, 2));

    let gray = LETTERBOX_PAD_VALUE as f32 / 255.0;
    for c in 0..3 {
      assert!((tensor[[0, c, 0, 0]] - gray).abs() < 1e-6);
      assert!((tensor[[0, c, 7, 7]] - gray).abs() < 1e-6);
    }
    assert!((tensor[[0, 0, 4, 4]] - 1.0).abs() < 1e-6);
    assert!(tensor[[0, 1, 4, 4]].abs() < 1e-6);
    assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
  }

  #[test]
  fn bgr_frame_is_converted_to_model_order() {
    // BGR 存储的纯蓝色
    let frame = Frame::filled(0, 4, 4, PixelFormat::Bgr, [255, 0, 0]);
    let (tensor, _) = Letterbox::new(4, 4).apply(&frame).unwrap();
    assert!(tensor[[0, 0, 1, 1]].abs() < 1e-6);
    assert!((tensor[[0, 2, 1, 1]] - 1.0).abs() < 1e-6);

    let (tensor, _) = Letterbox::new(4, 4)
      .with_channel_order(PixelFormat::Bgr)
      .apply(&frame)
      .unwrap();
    assert!((tensor[[0, 0, 1, 1]] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn empty_frame_is_rejected() {
    let frame = Frame::filled(0, 0, 10, PixelFormat::Rgb, [0, 0, 0]);
    assert_eq!(
      Letterbox::default().apply(&frame).unwrap_err(),
      PreprocessError::EmptyFrame { width: 0, height: 10 }
    );
  }
}
