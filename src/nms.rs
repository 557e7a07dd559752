// 该文件是 Tracklet （影踪） 项目的一部分。
// src/nms.rs - 非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::model::CandidateBox;

/// 贪心非极大值抑制，不区分类别
///
/// 丢弃分数不高于 `score_threshold` 的候选框，其余按分数降序排列，
/// 依次保留最高分的框并剔除与其 IoU 大于 `iou_threshold` 的框。
/// 不同类别的重叠框同样互相抑制。
pub fn non_max_suppression(
  mut xs: Vec<CandidateBox>,
  iou_threshold: f32,
  score_threshold: f32,
) -> Vec<CandidateBox> {
  let total = xs.len();
  xs.retain(|c| c.score > score_threshold);
  xs.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut current_index = 0;
  for index in 0..xs.len() {
    let mut drop = false;
    for prev_index in 0..current_index {
      if xs[prev_index].bbox.iou(&xs[index].bbox) > iou_threshold {
        drop = true;
        break;
      }
    }
    if !drop {
      xs.swap(current_index, index);
      current_index += 1;
    }
  }
  xs.truncate(current_index);

  debug!("NMS: {} -> {}", total, xs.len());
  xs
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;

  fn candidate(cx: f32, cy: f32, class_index: usize, score: f32) -> CandidateBox {
    CandidateBox {
      bbox: BBox::new(cx, cy, 0.2, 0.2),
      class_index,
      score,
    }
  }

  #[test]
  fn test_overlapping_boxes_of_any_class_suppress() {
    let kept = non_max_suppression(
      vec![
        candidate(0.5, 0.5, 0, 0.6),
        candidate(0.51, 0.5, 1, 0.9),
        candidate(0.1, 0.1, 0, 0.5),
      ],
      0.5,
      0.4,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].class_index, 1);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].score, 0.5);
  }

  #[test]
  fn test_score_filter_and_order() {
    let kept = non_max_suppression(
      vec![
        candidate(0.1, 0.1, 0, 0.45),
        candidate(0.5, 0.5, 0, 0.3),
        candidate(0.9, 0.9, 0, 0.8),
      ],
      0.5,
      0.4,
    );
    let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
    assert_eq!(scores, vec![0.8, 0.45]);
  }

  #[test]
  fn test_iou_equal_to_threshold_is_kept() {
    // 小框完全落在大框内，面积为一半，IoU 恰为 0.5
    let large = CandidateBox {
      bbox: BBox::new(0.5, 0.5, 0.5, 0.5),
      class_index: 0,
      score: 0.9,
    };
    let small = CandidateBox {
      bbox: BBox::new(0.5, 0.5, 0.25, 0.5),
      class_index: 1,
      score: 0.8,
    };
    assert_eq!(large.bbox.iou(&small.bbox), 0.5);

    let kept = non_max_suppression(vec![large, small], 0.5, 0.0);
    assert_eq!(kept.len(), 2);

    let kept = non_max_suppression(vec![large, small], 0.49, 0.0);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn test_empty_input() {
    assert!(non_max_suppression(Vec::new(), 0.5, 0.4).is_empty());
  }
}
