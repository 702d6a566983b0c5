// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::{Array2, Array4, ArrayView2};
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 模型输入张量，形状为 (1, 3, H, W)，取值范围 [0, 1]
pub type ModelInput = Array4<f32>;

/// 推理引擎的同步调用接口
pub trait Model {
  type Error;

  fn infer(&self, input: &ModelInput) -> Result<RawPrediction, Self::Error>;
}

/// 模型原始输出，形状为 (N, 4+K) 或其转置
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
  data: Array2<f32>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RawPredictionError {
  #[error("输出张量维度不支持: {0:?}")]
  UnsupportedRank(Vec<usize>),
  #[error("输出张量形状 {shape:?} 与数据长度 {len} 不符")]
  LengthMismatch { shape: Vec<usize>, len: usize },
}

impl From<Array2<f32>> for RawPrediction {
  fn from(data: Array2<f32>) -> Self {
    Self { data }
  }
}

impl RawPrediction {
  /// 从任意形状构造，去掉前导的单位维度（批次维）后必须是二维
  pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self, RawPredictionError> {
    let dims = shape
      .iter()
      .copied()
      .skip_while(|&d| d == 1)
      .collect::<Vec<_>>();
    // [1, 1, 84] 这类输出去掉前导 1 后只剩一维，补回一行
    let (rows, cols) = match dims.as_slice() {
      [rows, cols] => (*rows, *cols),
      [cols] if shape.len() >= 2 => (1, *cols),
      [] if shape.len() >= 2 => (1, 1),
      _ => return Err(RawPredictionError::UnsupportedRank(shape.to_vec())),
    };

    let len = data.len();
    let data = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
      RawPredictionError::LengthMismatch {
        shape: shape.to_vec(),
        len,
      }
    })?;
    Ok(Self { data })
  }

  pub fn view(&self) -> ArrayView2<'_, f32> {
    self.data.view()
  }

  pub fn shape(&self) -> (usize, usize) {
    self.data.dim()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

/// 原图像素坐标系下的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl BoundingBox {
  pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn width(&self) -> f32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> f32 {
    self.y_max - self.y_min
  }

  pub fn area(&self) -> f32 {
    let (w, h) = (self.width(), self.height());
    if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
  }

  pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
    let x1 = self.x_min.max(other.x_min);
    let y1 = self.y_min.max(other.y_min);
    let x2 = self.x_max.min(other.x_max);
    let y2 = self.y_max.min(other.y_max);
    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  /// 交并比；不相交或任一面积非正时为 0
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let area_a = self.area();
    let area_b = other.area();
    if area_a <= 0.0 || area_b <= 0.0 {
      return 0.0;
    }

    let intersection = self.intersection_area(other);
    if intersection <= 0.0 {
      return 0.0;
    }

    let union = area_a + area_b - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub confidence: f32,
  pub class_id: usize,
}

impl Detection {
  pub fn label(&self) -> &'static str {
    coco_label(self.class_id).unwrap_or("unknown")
  }
}

/// 一帧的最终检测结果，按置信度降序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

mod label;
pub use self::label::{COCO_CLASSES, coco_label};

#[cfg(feature = "onnx_model")]
mod onnx;
#[cfg(feature = "onnx_model")]
pub use self::onnx::{OnnxModel, OnnxModelError};

/// ONNX 模型的 URL 方案，未启用 `onnx_model` 时也用于给出明确的错误
pub const ONNX_SCHEME: &str = "onnx";

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "onnx_model")]
  #[error("ONNX 模型错误: {0}")]
  OnnxModelError(#[from] OnnxModelError),
  #[error("模型方案 '{scheme}' 未编译，请启用 `{feature}` 特性")]
  BackendDisabled { scheme: String, feature: &'static str },
  #[error("不支持的模型方案: {0}")]
  SchemeMismatch(String),
}

pub enum ModelWrapper {
  #[cfg(feature = "onnx_model")]
  Onnx(OnnxModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "onnx_model")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == OnnxModel::SCHEME {
        return Ok(ModelWrapper::Onnx(OnnxModel::from_url(url)?));
      }
    }
    #[cfg(not(feature = "onnx_model"))]
    {
      if url.scheme() == ONNX_SCHEME {
        return Err(ModelError::BackendDisabled {
          scheme: url.scheme().to_string(),
          feature: "onnx_model",
        });
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Error = ModelError;

  #[allow(unused_variables)]
  fn infer(&self, input: &ModelInput) -> Result<RawPrediction, Self::Error> {
    match *self {
      #[cfg(feature = "onnx_model")]
      ModelWrapper::Onnx(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
