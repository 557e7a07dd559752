// 该文件是 Tracklet （影踪） 项目的一部分。
// src/inference.rs - 推理引擎控制接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::camera::CameraId;

/// 外部推理引擎，每个相机对应一路推理
///
/// 推理结果通过 [`crate::controller::DetectionController::on_inference_finished`] 回送。
pub trait InferenceEngine {
  /// 该相机的推理是否空闲
  fn is_idle(&self, camera: CameraId) -> bool;

  /// 开始按帧调度推理
  fn run_scheduled(&mut self, camera: CameraId);

  /// 取消该相机的推理
  fn cancel(&mut self, camera: CameraId);
}
