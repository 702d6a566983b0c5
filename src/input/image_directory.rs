// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_directory.rs - 图像序列目录输入
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

use std::collections::VecDeque;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{FrameSource, read_image_file::load_rgb_image},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("输入源尚未打开")]
  NotOpened,
}

/// 把目录中按文件名排序的图片当作连续的视频帧
///
/// 无法解码的文件会被跳过，不计入读取失败，帧序号只分配给成功解码的图片。
pub struct ImageDirectoryInput {
  directory: PathBuf,
  pending: Option<VecDeque<PathBuf>>,
  next_index: u64,
  skipped: u64,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }
    Ok(Self::new(url.path()))
  }
}

impl ImageDirectoryInput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      pending: None,
      next_index: 0,
      skipped: 0,
    }
  }

  /// 已跳过的无法解码的文件数
  pub fn skipped(&self) -> u64 {
    self.skipped
  }
}

fn is_image_file(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

impl FrameSource for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn open(&mut self) -> Result<(), Self::Error> {
    let mut files = std::fs::read_dir(&self.directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_file() && is_image_file(path))
      .collect::<Vec<_>>();
    files.sort();

    info!(
      "图像目录已打开: {}，共 {} 帧",
      self.directory.display(),
      files.len()
    );
    self.pending = Some(files.into());
    self.next_index = 0;
    self.skipped = 0;
    Ok(())
  }

  fn read_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    let pending = self
      .pending
      .as_mut()
      .ok_or(ImageDirectoryInputError::NotOpened)?;

    // 文件损坏不代表设备故障，跳过后继续读取下一个文件
    while let Some(path) = pending.pop_front() {
      match load_rgb_image(&path) {
        Ok(image) => {
          let index = self.next_index;
          self.next_index += 1;
          debug!("读取第 {} 帧: {}", index, path.display());
          return Ok(Some(Frame::from_rgb_image(index, image)));
        }
        Err(e) => {
          self.skipped += 1;
          warn!("跳过无法解码的图像 {}: {}", path.display(), e);
        }
      }
    }

    Ok(None)
  }
}
