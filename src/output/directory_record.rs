// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, DrawError},
    save_image_file::draw_from_url,
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 检测记录，与原始帧一起保存
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn record(&self, frame: &Frame, result: Option<&DetectResult>, path: &Path) -> Result<(), DirectoryRecordOutputError> {
    let items = result
      .map(|r| {
        r.items
          .iter()
          .map(|item| {
            let label = if self.label_with_name {
              json!(item.label())
            } else {
              json!(item.class_id)
            };
            json!({
              "label": label,
              "score": item.confidence,
              "bbox": [item.bbox.x_min, item.bbox.y_min, item.bbox.x_max, item.bbox.y_max],
            })
          })
          .collect::<Vec<_>>()
      })
      .unwrap_or_default();

    let record = json!({
      "frame": frame.index(),
      "width": frame.width(),
      "height": frame.height(),
      "annotated": result.is_some(),
      "detections": items,
    });
    std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&record)?)?;
    Ok(())
  }
}

pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &Frame,
    result: Option<&DetectResult>,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_detection(frame, result).save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.to_rgb_image().save(path)?;
        record.record(frame, result, path)?;
      }
    };

    Ok(())
  }
}

/// 按日期分目录保存帧
///
/// URL 形如 `folder:///data/record?record=name&always`：
/// - `record=name|id` 保存原始帧并附带 JSON 记录，否则保存标注后的图像；
/// - `always` 时没有检测结果的帧也会保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  always: bool,
  saved: u64,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = match uri.query_pairs().find(|(k, _)| k == "record") {
      Some((_, v)) => DrawWrapper::Record(Record {
        label_with_name: v != "id",
      }),
      None => DrawWrapper::Draw(Box::new(draw_from_url(uri)?)),
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    let directory = PathBuf::from(uri.path());
    std::fs::create_dir_all(&directory)?;
    info!("记录目录: {}", directory.display());

    Ok(DirectoryRecordOutput {
      directory,
      draw,
      always,
      saved: 0,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_path(&self, frame: &Frame) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!("{}-{:06}.png", now.format("%H-%M-%S"), frame.index())))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&mut self, frame: &Frame, result: Option<&DetectResult>) -> Result<(), Self::Error> {
    let has_detections = result.map(|r| !r.is_empty()).unwrap_or(false);
    if !self.always && !has_detections {
      return Ok(());
    }

    let path = self.frame_path(frame)?;
    self.draw.save_result(&path, frame, result)?;
    self.saved += 1;
    debug!("保存帧 {} 到 {}", frame.index(), path.display());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    info!("目录记录结束，共保存 {} 帧", self.saved);
    Ok(())
  }
}
