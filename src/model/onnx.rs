// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 模型
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
use std::sync::Mutex;

use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Model, ModelInput, RawPrediction, RawPredictionError},
};

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("ONNX Runtime 会话错误: {0}")]
  SessionError(String),
  #[error("推理错误: {0}")]
  InferError(String),
  #[error("模型没有输出")]
  NoOutput,
  #[error("输出张量形状错误: {0}")]
  OutputShape(#[from] RawPredictionError),
}

/// 单输入单输出的 YOLO ONNX 模型
pub struct OnnxModel {
  // ort 的 run 需要独占会话
  session: Mutex<Session>,
}

impl FromUrlWithScheme for OnnxModel {
  const SCHEME: &'static str = super::ONNX_SCHEME;
}

impl FromUrl for OnnxModel {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Self::load(Path::new(url.path()))
  }
}

impl OnnxModel {
  pub fn load(path: &Path) -> Result<Self, OnnxModelError> {
    if !path.exists() {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型文件不存在: {}",
        path.display()
      )));
    }

    info!("加载模型文件: {}", path.display());
    let session = Session::builder()
      .map_err(|e| OnnxModelError::SessionError(e.to_string()))?
      .commit_from_file(path)
      .map_err(|e| OnnxModelError::SessionError(e.to_string()))?;
    info!("模型加载完成");

    Ok(Self {
      session: Mutex::new(session),
    })
  }
}

impl Model for OnnxModel {
  type Error = OnnxModelError;

  fn infer(&self, input: &ModelInput) -> Result<RawPrediction, Self::Error> {
    debug!("设置模型输入: {:?}", input.shape());
    let tensor =
      TensorRef::from_array_view(input.view()).map_err(|e| OnnxModelError::InferError(e.to_string()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionError("会话锁已中毒".to_string()))?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![tensor])
      .map_err(|e| OnnxModelError::InferError(e.to_string()))?;

    if outputs.len() == 0 {
      return Err(OnnxModelError::NoOutput);
    }

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| OnnxModelError::InferError(e.to_string()))?;
    let shape = shape.iter().map(|&d| d.max(0) as usize).collect::<Vec<_>>();
    debug!("模型输出形状: {:?}", shape);

    Ok(RawPrediction::from_shape_vec(&shape, data.to_vec())?)
  }
}
