// 该文件是 Tracklet （影踪） 项目的一部分。
// src/model.rs - 模型输出与后处理接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// 单个检测头的原始输出张量
///
/// `data` 的布局为 `[height, width, anchors, classes + 5]`，
/// 长度必须等于 `width * height * anchors * (classes + 5)`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHeadOutput {
  pub width: usize,
  pub height: usize,
  pub data: Vec<f32>,
}

impl RawHeadOutput {
  pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
    Self {
      width,
      height,
      data,
    }
  }
}

/// 解码后、NMS 前的候选框，仅在一帧内有效
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateBox {
  pub bbox: BBox,
  pub class_index: usize,
  pub score: f32,
}

/// 检测模型的后处理接口，推理本身由外部推理引擎完成
pub trait Model {
  type Output;
  type Error;

  fn postprocess(
    &self,
    outputs: &[RawHeadOutput],
    score_threshold: f32,
  ) -> Result<Self::Output, Self::Error>;
}

#[cfg(feature = "model_yolov7")]
mod yolov7;
#[cfg(feature = "model_yolov7")]
pub use self::yolov7::{Yolo7, Yolo7Builder, Yolo7Error};
