// 该文件是 Shanan （山南西风） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::convert::Infallible;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, model::DetectResult};

/// 接收处理后的帧；`result` 为 `None` 表示该帧未能完成检测，按原样输出
pub trait Render {
  type Error;

  fn render_result(&mut self, frame: &Frame, result: Option<&DetectResult>) -> Result<(), Self::Error>;

  /// 释放输出资源
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 只把检测结果写入日志
#[derive(Debug, Default)]
pub struct LogOutput {
  frames: u64,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::default())
  }
}

impl Render for LogOutput {
  type Error = Infallible;

  fn render_result(&mut self, frame: &Frame, result: Option<&DetectResult>) -> Result<(), Self::Error> {
    self.frames += 1;
    match result {
      Some(result) => {
        info!("帧 {}: 检测到 {} 个对象", frame.index(), result.len());
        for det in result.items.iter() {
          info!(
            "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
            det.label(),
            det.confidence * 100.0,
            det.bbox.x_min,
            det.bbox.y_min,
            det.bbox.width(),
            det.bbox.height()
          );
        }
      }
      None => debug!("帧 {}: 未标注", frame.index()),
    }
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    info!("日志输出结束，共 {} 帧", self.frames);
    Ok(())
  }
}

/// 丢弃所有帧，用于输出无法打开时继续处理
#[derive(Debug, Default)]
pub struct DiscardOutput;

impl Render for DiscardOutput {
  type Error = Infallible;

  fn render_result(&mut self, _frame: &Frame, _result: Option<&DetectResult>) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl From<Infallible> for OutputError {
  fn from(err: Infallible) -> Self {
    match err {}
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  Discard(DiscardOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFile(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(SaveImageFileOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(DirectoryRecordOutput::from_url(url)?)),
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&mut self, frame: &Frame, result: Option<&DetectResult>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(frame, result).map_err(OutputError::from),
      OutputWrapper::Discard(output) => output.render_result(frame, result).map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.render_result(frame, result).map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.render_result(frame, result).map_err(OutputError::from),
    }
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.finish().map_err(OutputError::from),
      OutputWrapper::Discard(output) => output.finish().map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFile(output) => output.finish().map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output.finish().map_err(OutputError::from),
    }
  }
}
