// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
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

use crate::model::Detection;

/// 按类别去除重复检测框
///
/// 先按置信度降序稳定排序，再对同类别、位置靠后的框做 IoU 比较，
/// `IoU > iou_threshold` 的被抑制。不同类别互不影响，输出保持降序。
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  // sort_by 是稳定排序，同分时保留解码顺序
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut suppressed = vec![false; detections.len()];
  for i in 0..detections.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..detections.len() {
      if suppressed[j] || detections[i].class_id != detections[j].class_id {
        continue;
      }
      if detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  let mut flags = suppressed.into_iter();
  detections.retain(|_| !flags.next().unwrap_or(false));
  detections
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  fn det(x_min: f32, y_min: f32, x_max: f32, y_max: f32, confidence: f32, class_id: usize) -> Detection {
    Detection {
      bbox: BoundingBox::new(x_min, y_min, x_max, y_max),
      confidence,
      class_id,
    }
  }

  #[test]
  fn nms_keeps_higher_confidence_of_same_class() {
    // IoU = 90 / 100 = 0.9
    let dets = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.6, 1),
      det(0.0, 0.0, 10.0, 9.0, 0.8, 1),
    ];
    let kept = non_maximum_suppression(dets, 0.45);
    assert_eq!(kept, vec![det(0.0, 0.0, 10.0, 9.0, 0.8, 1)]);
  }

  #[test]
  fn nms_overlap_but_different_classes() {
    let dets = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.6, 1),
      det(0.0, 0.0, 10.0, 9.0, 0.8, 2),
    ];
    let kept = non_maximum_suppression(dets, 0.45);
    assert_eq!(
      kept,
      vec![det(0.0, 0.0, 10.0, 9.0, 0.8, 2), det(0.0, 0.0, 10.0, 10.0, 0.6, 1)]
    );
  }

  #[test]
  fn nms_no_overlap() {
    let dets = vec![
      det(0.0, 0.0, 1.0, 1.0, 0.6, 0),
      det(2.0, 2.0, 3.0, 3.0, 0.6, 0),
    ];
    let kept = non_maximum_suppression(dets.clone(), 0.5);
    assert_eq!(kept, dets);
  }

  #[test]
  fn nms_standard_usage() {
    let dets = vec![
      det(0.0, 0.0, 4.0, 4.0, 0.6, 0),
      det(0.0, 0.0, 5.0, 5.0, 0.55, 0),
      det(6.0, 6.0, 10.0, 10.0, 0.75, 0),
    ];
    let kept = non_maximum_suppression(dets, 0.5);
    assert_eq!(
      kept,
      vec![det(6.0, 6.0, 10.0, 10.0, 0.75, 0), det(0.0, 0.0, 4.0, 4.0, 0.6, 0)]
    );
  }

  #[test]
  fn suppressed_box_does_not_suppress_others() {
    // b 被 a 抑制；c 与 b 重叠较多、与 a 重叠较少，应当保留
    let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0);
    let b = det(3.0, 0.0, 13.0, 10.0, 0.8, 0);
    let c = det(5.0, 0.0, 15.0, 10.0, 0.7, 0);
    let kept = non_maximum_suppression(vec![c.clone(), b, a.clone()], 0.45);
    assert_eq!(kept, vec![a, c]);
  }

  #[test]
  fn iou_equal_to_threshold_is_kept() {
    // IoU = 50 / 100
    let dets = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
      det(0.0, 0.0, 10.0, 5.0, 0.8, 0),
    ];
    let kept = non_maximum_suppression(dets, 0.5);
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn empty_input() {
    assert!(non_maximum_suppression(Vec::new(), 0.45).is_empty());
  }
}
