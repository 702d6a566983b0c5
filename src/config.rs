// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 流水线参数
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

use thiserror::Error;

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_QUEUE_CAPACITY: usize = 24;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_NUM_CLASSES: usize = 80;
pub const DEFAULT_MAX_READ_FAILURES: usize = 8;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("队列容量必须大于 0")]
  ZeroQueueCapacity,
  #[error("{name} 必须在 [0, 1] 范围内，实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidInputSize { width: u32, height: u32 },
  #[error("类别数必须大于 0")]
  ZeroClasses,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub queue_capacity: usize,
  pub conf_threshold: f32,
  pub iou_threshold: f32,
  pub input_width: u32,
  pub input_height: u32,
  pub num_classes: usize,
  /// 连续读取失败达到该次数后视为输入结束
  pub max_read_failures: usize,
  /// 处理到指定帧数后停止，`None` 表示不限制
  pub max_frames: Option<u64>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
      num_classes: DEFAULT_NUM_CLASSES,
      max_read_failures: DEFAULT_MAX_READ_FAILURES,
      max_frames: None,
    }
  }
}

impl PipelineConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.queue_capacity == 0 {
      return Err(ConfigError::ZeroQueueCapacity);
    }
    for (name, value) in [
      ("置信度阈值", self.conf_threshold),
      ("IoU 阈值", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize {
        width: self.input_width,
        height: self.input_height,
      });
    }
    if self.num_classes == 0 {
      return Err(ConfigError::ZeroClasses);
    }
    Ok(())
  }
}
