// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const FRAME_CHANNELS: usize = 3;

/// 帧像素的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
  #[default]
  Rgb,
  Bgr,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 采集得到的一帧图像，HWC 交错排列，每通道 8 位
#[derive(Debug, Clone)]
pub struct Frame {
  index: u64,
  width: u32,
  height: u32,
  format: PixelFormat,
  data: Box<[u8]>,
}

impl Frame {
  pub fn new(
    index: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = FRAME_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      index,
      width,
      height,
      format,
      data: data.into_boxed_slice(),
    })
  }

  /// 用单一颜色填充的帧，主要用于测试与合成输入
  pub fn filled(index: u64, width: u32, height: u32, format: PixelFormat, pixel: [u8; 3]) -> Self {
    let data = pixel
      .iter()
      .copied()
      .cycle()
      .take(FRAME_CHANNELS * width as usize * height as usize)
      .collect::<Vec<_>>();

    Self {
      index,
      width,
      height,
      format,
      data: data.into_boxed_slice(),
    }
  }

  pub fn from_rgb_image(index: u64, image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      index,
      width,
      height,
      format: PixelFormat::Rgb,
      data: image.into_raw().into_boxed_slice(),
    }
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    FRAME_CHANNELS
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }

  /// 坐标 (x, y) 处的像素，按 RGB 顺序返回
  pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
    let idx = (y as usize * self.width as usize + x as usize) * FRAME_CHANNELS;
    let px = &self.data[idx..idx + FRAME_CHANNELS];
    match self.format {
      PixelFormat::Rgb => [px[0], px[1], px[2]],
      PixelFormat::Bgr => [px[2], px[1], px[0]],
    }
  }

  /// 复制出一份 RGB 图像，用于标注输出
  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(self.width, self.height, |x, y| Rgb(self.rgb_at(x, y)))
  }
}
