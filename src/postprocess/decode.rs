// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/decode.rs - YOLO 输出解码
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

use ndarray::{ArrayView1, ArrayView2, s};
use thiserror::Error;
use tracing::debug;

use crate::{
  model::{BoundingBox, Detection, RawPrediction},
  preprocess::GeometricTransform,
};

/// 框的宽或高被裁剪成非正数时补足的像素数
pub const DEGENERATE_EXPAND_PX: f32 = 1.0;

const BOX_ATTRIBUTES: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("模型输出为空")]
  Empty,
  #[error("模型输出形状 [{rows}, {cols}] 不符合预期，期望某一维为 {expected}")]
  ShapeMismatch {
    rows: usize,
    cols: usize,
    expected: usize,
  },
}

/// 把 (N, 4+K) 的原始输出解码为原图坐标系下的候选框
///
/// 每个锚点的前四列为模型输入像素空间中的 (cx, cy, w, h)，其后为 K 个类别分数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoder {
  pub num_classes: usize,
  pub degenerate_expand: f32,
}

impl Default for Decoder {
  fn default() -> Self {
    Self::new(80)
  }
}

impl Decoder {
  pub fn new(num_classes: usize) -> Self {
    Self {
      num_classes,
      degenerate_expand: DEGENERATE_EXPAND_PX,
    }
  }

  pub fn with_degenerate_expand(mut self, pixels: f32) -> Self {
    self.degenerate_expand = pixels;
    self
  }

  /// 每个锚点的属性个数
  pub fn attributes(&self) -> usize {
    BOX_ATTRIBUTES + self.num_classes
  }

  /// 统一方向：返回每行一个锚点的视图
  ///
  /// 列数等于 4+K 时直接使用，否则行数等于 4+K 时转置；两者都相等时按行处理。
  pub fn anchors<'a>(&self, raw: &'a RawPrediction) -> Result<ArrayView2<'a, f32>, DecodeError> {
    if raw.is_empty() {
      return Err(DecodeError::Empty);
    }

    let (rows, cols) = raw.shape();
    let expected = self.attributes();
    if cols == expected {
      Ok(raw.view())
    } else if rows == expected {
      debug!("模型输出为 [{}, {}]，按列解释锚点", rows, cols);
      Ok(raw.view().reversed_axes())
    } else {
      Err(DecodeError::ShapeMismatch {
        rows,
        cols,
        expected,
      })
    }
  }

  pub fn decode(
    &self,
    raw: &RawPrediction,
    transform: &GeometricTransform,
    original_size: (u32, u32),
    conf_threshold: f32,
  ) -> Result<Vec<Detection>, DecodeError> {
    let anchors = self.anchors(raw)?;

    let detections = anchors
      .rows()
      .into_iter()
      .filter_map(|anchor| self.decode_anchor(anchor, transform, original_size, conf_threshold))
      .collect::<Vec<_>>();

    debug!(
      "解码 {} 个锚点，得到 {} 个候选框",
      anchors.nrows(),
      detections.len()
    );
    Ok(detections)
  }

  fn decode_anchor(
    &self,
    anchor: ArrayView1<'_, f32>,
    transform: &GeometricTransform,
    (width, height): (u32, u32),
    conf_threshold: f32,
  ) -> Option<Detection> {
    let (class_id, score) = best_class(anchor.slice(s![BOX_ATTRIBUTES..]))?;
    if score < conf_threshold {
      return None;
    }

    let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
    if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
      return None;
    }

    let (x1, y1) = transform.to_original(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = transform.to_original(cx + w / 2.0, cy + h / 2.0);
    let bbox = self.clamp_box(BoundingBox::new(x1, y1, x2, y2), width as f32, height as f32)?;

    Some(Detection {
      bbox,
      confidence: score,
      class_id,
    })
  }

  /// 裁剪到画面内；退化的边补足后仍退化则丢弃
  fn clamp_box(&self, bbox: BoundingBox, width: f32, height: f32) -> Option<BoundingBox> {
    // 与画面没有任何接触的框直接丢弃，贴边的框留给下面补足
    if bbox.x_max < 0.0 || bbox.y_max < 0.0 || bbox.x_min > width || bbox.y_min > height {
      return None;
    }

    let (x_min, x_max) = self.expand_side(bbox.x_min.clamp(0.0, width), bbox.x_max.clamp(0.0, width), width);
    let (y_min, y_max) = self.expand_side(bbox.y_min.clamp(0.0, height), bbox.y_max.clamp(0.0, height), height);
    if x_max <= x_min || y_max <= y_min {
      return None;
    }

    Some(BoundingBox::new(x_min, y_min, x_max, y_max))
  }

  // 退化的边向远端补足；贴着远端边界时改为向近端补足
  fn expand_side(&self, min: f32, max: f32, bound: f32) -> (f32, f32) {
    if max > min {
      return (min, max);
    }
    if min + self.degenerate_expand <= bound {
      (min, min + self.degenerate_expand)
    } else {
      ((bound - self.degenerate_expand).max(0.0), bound)
    }
  }
}

/// 最高分类别；同分时取下标最小者，NaN 忽略
fn best_class(scores: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (class_id, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, best_score)) if score <= best_score => {}
      _ => best = Some((class_id, score)),
    }
  }
  best
}
