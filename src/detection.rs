// 该文件是 Tracklet （影踪） 项目的一部分。
// src/detection.rs - 单帧检测结果构建
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
  camera::{CameraId, CameraPose},
  geometry::BBox,
  label::LabelTable,
  model::CandidateBox,
};

/// 单个相机单帧的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  pub bbox: BBox,
  pub aux_score: i32,
}

/// 一次推理回调的检测批次：相机、发起推理时的位姿与检测列表
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBatch {
  pub camera: CameraId,
  pub pose: CameraPose,
  pub detections: Vec<Detection>,
}

/// 将 NMS 后的候选框映射为带标签的检测结果，保持输入顺序
pub fn build_detections(candidates: &[CandidateBox], labels: &LabelTable) -> Vec<Detection> {
  let detections: Vec<Detection> = candidates
    .iter()
    .filter_map(|candidate| match labels.get(candidate.class_index) {
      Some(setting) => Some(Detection {
        label: setting.label.clone(),
        confidence: candidate.score,
        bbox: candidate.bbox,
        aux_score: setting.aux_score,
      }),
      None => {
        warn!("类别索引 {} 超出标签表范围", candidate.class_index);
        None
      }
    })
    .collect();

  debug!("构建 {} 个检测结果", detections.len());
  detections
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::LabelSetting;

  #[test]
  fn test_build_detections() {
    let labels = LabelTable::new(vec![
      LabelSetting {
        label: "apple".to_string(),
        aux_score: 1,
      },
      LabelSetting {
        label: "chips".to_string(),
        aux_score: 4,
      },
    ])
    .unwrap();

    let candidates = [
      CandidateBox {
        bbox: BBox::new(0.2, 0.3, 0.1, 0.1),
        class_index: 1,
        score: 0.9,
      },
      CandidateBox {
        bbox: BBox::new(0.7, 0.3, 0.1, 0.1),
        class_index: 7,
        score: 0.8,
      },
      CandidateBox {
        bbox: BBox::new(0.5, 0.5, 0.2, 0.2),
        class_index: 0,
        score: 0.5,
      },
    ];

    let detections = build_detections(&candidates, &labels);
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].label, "chips");
    assert_eq!(detections[0].aux_score, 4);
    assert_eq!(detections[0].confidence, 0.9);
    assert_eq!(detections[1].label, "apple");
    assert_eq!(detections[1].bbox, BBox::new(0.5, 0.5, 0.2, 0.2));
  }
}
