// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::convert::Infallible;

use thiserror::Error;

use crate::{FromUrl, frame::Frame};

/// 顺序产生帧的输入源
///
/// `read_frame` 返回 `Ok(None)` 表示没有更多帧；`Err` 表示本次读取失败，
/// 调用方可以继续尝试下一帧。
pub trait FrameSource {
  type Error;

  fn open(&mut self) -> Result<(), Self::Error>;
  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error>;
}

/// 把任意帧迭代器包装为输入源，常用于合成输入
pub struct IterInput<I> {
  inner: I,
}

impl<I: Iterator<Item = Frame>> IterInput<I> {
  pub fn new(inner: I) -> Self {
    Self { inner }
  }
}

impl<I: Iterator<Item = Frame>> FrameSource for IterInput<I> {
  type Error = Infallible;

  fn open(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }

  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    Ok(self.inner.next())
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_image_file")]
mod image_directory;
#[cfg(feature = "read_image_file")]
pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("图像目录输入错误: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageDirectory(ImageDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?));
      }
      if url.scheme() == ImageDirectoryInput::SCHEME {
        return Ok(InputWrapper::ImageDirectory(ImageDirectoryInput::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FrameSource for InputWrapper {
  type Error = InputError;

  fn open(&mut self) -> Result<(), Self::Error> {
    match *self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(ref mut input) => input.open().map_err(InputError::from),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(ref mut input) => input.open().map_err(InputError::from),
    }
  }

  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    match *self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(ref mut input) => input.read_frame().map_err(InputError::from),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(ref mut input) => input.read_frame().map_err(InputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::PixelFormat;

  #[test]
  fn iter_input_signals_exhaustion() {
    let frames = (0..2).map(|i| Frame::filled(i, 2, 2, PixelFormat::Rgb, [0, 0, 0]));
    let mut input = IterInput::new(frames);
    assert!(input.open().is_ok());
    assert_eq!(input.read_frame().unwrap().map(|f| f.index()), Some(0));
    assert_eq!(input.read_frame().unwrap().map(|f| f.index()), Some(1));
    assert!(input.read_frame().unwrap().is_none());
  }

  #[test]
  fn unknown_input_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
