// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detector.rs - 单帧目标检测：预处理、推理、解码与 NMS
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
use tracing::debug;

use crate::{
  config::PipelineConfig,
  frame::Frame,
  model::{DetectResult, Model},
  postprocess::{DecodeError, Decoder, non_maximum_suppression},
  preprocess::{Letterbox, PreprocessError},
};

/// 单帧处理失败的原因；均不致命，调用方按未标注帧继续
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("模型输出异常: {0}")]
  MalformedOutput(#[from] DecodeError),
}

/// YOLO 目标检测器
///
/// 本身不持有推理引擎，只负责引擎前后的几何变换与过滤，可在多帧间共享。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloDetector {
  pub letterbox: Letterbox,
  pub decoder: Decoder,
  /// 置信度阈值
  pub confidence_threshold: f32,
  /// NMS IOU 阈值
  pub nms_threshold: f32,
}

impl YoloDetector {
  pub fn new(letterbox: Letterbox, decoder: Decoder, confidence_threshold: f32, nms_threshold: f32) -> Self {
    Self {
      letterbox,
      decoder,
      confidence_threshold,
      nms_threshold,
    }
  }

  pub fn from_config(config: &PipelineConfig) -> Self {
    Self::new(
      Letterbox::new(config.input_width, config.input_height),
      Decoder::new(config.num_classes),
      config.conf_threshold,
      config.iou_threshold,
    )
  }

  /// 运行推理
  pub fn detect<M>(&self, frame: &Frame, model: &M) -> Result<DetectResult, DetectError>
  where
    M: Model,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let (tensor, transform) = self.letterbox.apply(frame)?;

    let raw = model
      .infer(&tensor)
      .map_err(|e| DetectError::Inference(Box::new(e)))?;

    let candidates = self
      .decoder
      .decode(&raw, &transform, frame.size(), self.confidence_threshold)?;
    let candidate_count = candidates.len();
    let detections = non_maximum_suppression(candidates, self.nms_threshold);
    debug!(
      "帧 {}: 候选框 {} 个，NMS 后保留 {} 个",
      frame.index(),
      candidate_count,
      detections.len()
    );

    Ok(detections.into())
  }
}
