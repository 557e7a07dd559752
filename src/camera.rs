// 该文件是 Tracklet （影踪） 项目的一部分。
// src/camera.rs - 相机标识、投影服务接口与位姿缓冲
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::VecDeque;
use std::fmt;

use nalgebra::{Isometry3, Point3, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// 相机在世界坐标系中的刚体位姿（相机坐标 -> 世界坐标）
pub type CameraPose = Isometry3<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraId {
  Left,
  Right,
}

impl CameraId {
  /// 左相机为主相机
  pub fn is_primary(self) -> bool {
    matches!(self, CameraId::Left)
  }
}

impl fmt::Display for CameraId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CameraId::Left => write!(f, "左相机"),
      CameraId::Right => write!(f, "右相机"),
    }
  }
}

/// 相机内参：分辨率与焦距，单位均为像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
  pub resolution: Vector2<f32>,
  pub focal_length: Vector2<f32>,
}

impl CameraIntrinsics {
  pub fn new(resolution: Vector2<f32>, focal_length: Vector2<f32>) -> Self {
    Self {
      resolution,
      focal_length,
    }
  }

  /// 将双目两侧内参融合：分辨率取 `self`，焦距取两者平均
  pub fn fuse(&self, other: &CameraIntrinsics) -> CameraIntrinsics {
    CameraIntrinsics {
      resolution: self.resolution,
      focal_length: (self.focal_length + other.focal_length) * 0.5,
    }
  }

  /// 归一化尺寸换算为距离 `depth` 处的绝对尺寸
  pub fn norm_to_absolute(&self, norm: Vector2<f32>, depth: f32, correction: f32) -> Vector2<f32> {
    Vector2::new(
      norm.x * self.resolution.x * depth * correction / self.focal_length.x,
      norm.y * self.resolution.y * depth * correction / self.focal_length.y,
    )
  }
}

/// 相机投影服务
pub trait CameraProjection {
  /// 将归一化屏幕坐标与绝对深度反投影到相机坐标系
  fn unproject(&self, camera: CameraId, xy: Vector2<f32>, depth: f32) -> Point3<f32>;

  fn intrinsics(&self, camera: CameraId) -> CameraIntrinsics;

  /// 近裁剪面深度
  fn near(&self) -> f32;

  /// 远裁剪面深度
  fn far(&self) -> f32;

  /// 将归一化屏幕坐标与深度投影到世界坐标系
  fn project(
    &self,
    camera: CameraId,
    pose: &CameraPose,
    xy: Vector2<f32>,
    depth: f32,
  ) -> Point3<f32> {
    pose * self.unproject(camera, xy, depth)
  }
}

/// 推理延迟修正用的位姿缓冲区
///
/// 发起推理时记录相机位姿，推理完成后取出最早的位姿与结果配对。
/// 主相机的结果消费位姿，副相机只读取不消费。
#[derive(Debug, Clone)]
pub struct PoseBuffer {
  poses: VecDeque<CameraPose>,
  window: usize,
  recording: bool,
}

impl PoseBuffer {
  pub fn new(window: usize) -> Self {
    Self {
      poses: VecDeque::with_capacity(window),
      window,
      recording: false,
    }
  }

  pub fn window(&self) -> usize {
    self.window
  }

  pub fn set_window(&mut self, window: usize) {
    self.window = window;
    while self.poses.len() > self.window {
      self.poses.pop_front();
    }
  }

  pub fn is_recording(&self) -> bool {
    self.recording
  }

  pub fn len(&self) -> usize {
    self.poses.len()
  }

  pub fn is_empty(&self) -> bool {
    self.poses.is_empty()
  }

  /// 清空缓冲区并开始记录
  pub fn start(&mut self) {
    self.poses.clear();
    self.recording = true;
  }

  /// 停止记录并清空缓冲区
  pub fn stop(&mut self) {
    self.recording = false;
    self.poses.clear();
  }

  /// 记录当前帧位姿，超出容量时丢弃最早的位姿
  pub fn record(&mut self, pose: CameraPose) {
    if !self.recording || self.window == 0 {
      return;
    }
    if self.poses.len() >= self.window {
      self.poses.pop_front();
    }
    self.poses.push_back(pose);
  }

  /// 取出与推理结果配对的位姿，缓冲区为空时退回当前位姿
  pub fn take(&mut self, camera: CameraId, current: &CameraPose) -> CameraPose {
    let pose = if camera.is_primary() {
      self.poses.pop_front()
    } else {
      self.poses.front().copied()
    };

    match pose {
      Some(pose) => {
        trace!("{}使用缓冲位姿, 剩余 {}", camera, self.poses.len());
        pose
      }
      None => {
        debug!("位姿缓冲区为空, {}使用当前位姿", camera);
        *current
      }
    }
  }
}
