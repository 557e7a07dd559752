// 该文件是 Tracklet （影踪） 项目的一部分。
// src/replay.rs - 离线回放：针孔投影、平面表面、回放推理引擎与日志跟踪对象
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  camera::{CameraId, CameraIntrinsics, CameraPose, CameraProjection},
  inference::InferenceEngine,
  model::RawHeadOutput,
  surface::{SpatialSurface, SurfaceHit},
  task::HostFrame,
  tracking::{Tracklet, TrackletFactory},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("回放文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("回放文件第 {line} 行解析错误: {source}")]
  Json {
    line: usize,
    source: serde_json::Error,
  },
  #[error("回放文件缺少场景描述")]
  MissingHeader,
  #[error("回放路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
}

/// 针孔相机投影，相机朝向 -Z，屏幕归一化坐标原点在左上角
///
/// 左右相机沿 x 轴相距 `baseline`，共用同一个设备位姿。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeProjection {
  pub left: CameraIntrinsics,
  pub right: CameraIntrinsics,
  pub baseline: f32,
  pub near: f32,
  pub far: f32,
}

impl Default for PinholeProjection {
  fn default() -> Self {
    let intrinsics = CameraIntrinsics::new(Vector2::new(640.0, 480.0), Vector2::new(450.0, 450.0));
    Self {
      left: intrinsics,
      right: intrinsics,
      baseline: 0.0,
      near: 1.0,
      far: 1000.0,
    }
  }
}

impl CameraProjection for PinholeProjection {
  fn unproject(&self, camera: CameraId, xy: Vector2<f32>, depth: f32) -> Point3<f32> {
    let intrinsics = self.intrinsics(camera);
    let offset = match camera {
      CameraId::Left => -0.5 * self.baseline,
      CameraId::Right => 0.5 * self.baseline,
    };
    Point3::new(
      (xy.x - 0.5) * intrinsics.resolution.x * depth / intrinsics.focal_length.x + offset,
      (0.5 - xy.y) * intrinsics.resolution.y * depth / intrinsics.focal_length.y,
      -depth,
    )
  }

  fn intrinsics(&self, camera: CameraId) -> CameraIntrinsics {
    match camera {
      CameraId::Left => self.left,
      CameraId::Right => self.right,
    }
  }

  fn near(&self) -> f32 {
    self.near
  }

  fn far(&self) -> f32 {
    self.far
  }
}

/// 无限大平面表面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneSurface {
  pub point: Point3<f32>,
  pub normal: Vector3<f32>,
}

impl Default for PlaneSurface {
  fn default() -> Self {
    Self {
      point: Point3::origin(),
      normal: Vector3::y(),
    }
  }
}

impl SpatialSurface for PlaneSurface {
  fn hit_test(&self, start: &Point3<f32>, end: &Point3<f32>) -> Option<SurfaceHit> {
    let normal = self.normal.try_normalize(f32::EPSILON)?;
    let direction = end - start;
    let denom = normal.dot(&direction);
    if denom.abs() < f32::EPSILON {
      return None;
    }

    let t = normal.dot(&(self.point - start)) / denom;
    if !(0.0..=1.0).contains(&t) {
      return None;
    }
    Some(SurfaceHit {
      position: start + direction * t,
      normal,
    })
  }
}

/// 回放推理引擎：只记录每个相机是否在运行
#[derive(Debug, Default)]
pub struct ReplayEngine {
  running: [bool; 2],
}

impl ReplayEngine {
  fn slot(camera: CameraId) -> usize {
    match camera {
      CameraId::Left => 0,
      CameraId::Right => 1,
    }
  }
}

impl InferenceEngine for ReplayEngine {
  fn is_idle(&self, camera: CameraId) -> bool {
    !self.running[Self::slot(camera)]
  }

  fn run_scheduled(&mut self, camera: CameraId) {
    debug!("{}开始调度推理", camera);
    self.running[Self::slot(camera)] = true;
  }

  fn cancel(&mut self, camera: CameraId) {
    self.running[Self::slot(camera)] = false;
  }
}

/// 回放位姿：位置与四元数 (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayPose {
  pub position: [f32; 3],
  #[serde(default = "ReplayPose::identity_rotation")]
  pub rotation: [f32; 4],
}

impl ReplayPose {
  fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
  }

  pub fn to_isometry(&self) -> CameraPose {
    let [x, y, z, w] = self.rotation;
    let [px, py, pz] = self.position;
    Isometry3::from_parts(
      Translation3::new(px, py, pz),
      UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
    )
  }
}

/// 回放文件第一行：场景与模型输出描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayHeader {
  /// 各检测头输出尺寸 (width, height)
  pub head_shapes: Vec<(usize, usize)>,
  #[serde(default)]
  pub projection: PinholeProjection,
  #[serde(default)]
  pub surface: PlaneSurface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
  pub camera: CameraId,
  pub outputs: Vec<RawHeadOutput>,
}

/// 回放文件中的一帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
  pub pose: ReplayPose,
  #[serde(default)]
  pub results: Vec<ReplayResult>,
}

impl From<ReplayFrame> for HostFrame {
  fn from(frame: ReplayFrame) -> Self {
    HostFrame {
      pose: frame.pose.to_isometry(),
      results: frame
        .results
        .into_iter()
        .map(|r| (r.camera, r.outputs))
        .collect(),
    }
  }
}

/// JSON Lines 格式的回放文件：首行为 [`ReplayHeader`]，其后每行一个 [`ReplayFrame`]
#[derive(Debug, Clone)]
pub struct ReplayFile {
  header: ReplayHeader,
  frames: Vec<ReplayFrame>,
}

impl ReplayFile {
  pub fn parse(text: &str) -> Result<Self, ReplayError> {
    let mut lines = text
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty());

    let (idx, line) = lines.next().ok_or(ReplayError::MissingHeader)?;
    let header: ReplayHeader = serde_json::from_str(line).map_err(|source| ReplayError::Json {
      line: idx + 1,
      source,
    })?;

    let frames = lines
      .map(|(idx, line)| {
        serde_json::from_str(line).map_err(|source| ReplayError::Json {
          line: idx + 1,
          source,
        })
      })
      .collect::<Result<Vec<ReplayFrame>, _>>()?;

    Ok(Self { header, frames })
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
    let path = path.as_ref();
    info!("加载回放文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let file = Self::parse(&text)?;
    info!("回放文件共 {} 帧", file.frames.len());
    Ok(file)
  }

  pub fn header(&self) -> &ReplayHeader {
    &self.header
  }

  pub fn frames(&self) -> &[ReplayFrame] {
    &self.frames
  }

  /// 拆分为场景描述与宿主帧序列
  pub fn into_parts(self) -> (ReplayHeader, impl Iterator<Item = HostFrame>) {
    (self.header, self.frames.into_iter().map(HostFrame::from))
  }
}

impl FromUrlWithScheme for ReplayFile {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayFile {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(Self::SCHEME));
    }
    Self::from_path(url.path())
  }
}

/// 把状态变化写入日志的跟踪对象
#[derive(Debug, Clone, PartialEq)]
pub struct LogTracklet {
  id: usize,
  enabled: bool,
  label: Option<String>,
  aux_score: i32,
  position: Point3<f32>,
  rotation: UnitQuaternion<f32>,
  size: Vector2<f32>,
}

impl LogTracklet {
  pub fn id(&self) -> usize {
    self.id
  }

  pub fn label(&self) -> Option<&str> {
    self.label.as_deref()
  }

  pub fn aux_score(&self) -> i32 {
    self.aux_score
  }

  pub fn position(&self) -> Point3<f32> {
    self.position
  }

  pub fn rotation(&self) -> UnitQuaternion<f32> {
    self.rotation
  }

  pub fn size(&self) -> Vector2<f32> {
    self.size
  }
}

impl Tracklet for LogTracklet {
  fn set_data(&mut self, label: &str, aux_score: i32) {
    if self.label.as_deref() != Some(label) {
      self.label = Some(label.to_string());
    }
    self.aux_score = aux_score;
  }

  fn set_pose(
    &mut self,
    position: Point3<f32>,
    rotation: UnitQuaternion<f32>,
    width: f32,
    height: f32,
  ) {
    self.position = position;
    self.rotation = rotation;
    self.size = Vector2::new(width, height);
  }

  fn refresh_appearance(&mut self) {
    debug!(
      "跟踪对象 {}: {} (评分 {}) 位于 ({:.1}, {:.1}, {:.1}), 尺寸 {:.1} x {:.1}",
      self.id,
      self.label.as_deref().unwrap_or("-"),
      self.aux_score,
      self.position.x,
      self.position.y,
      self.position.z,
      self.size.x,
      self.size.y
    );
  }

  fn set_enabled(&mut self, enabled: bool) {
    self.enabled = enabled;
  }

  fn is_enabled(&self) -> bool {
    self.enabled
  }

  fn reset(&mut self) {
    self.label = None;
    self.aux_score = 0;
    self.position = Point3::origin();
    self.rotation = UnitQuaternion::identity();
    self.size = Vector2::zeros();
  }
}

#[derive(Debug, Default)]
pub struct LogTrackletFactory {
  spawned: usize,
}

impl TrackletFactory for LogTrackletFactory {
  type Tracklet = LogTracklet;

  fn instantiate(&mut self) -> LogTracklet {
    self.spawned += 1;
    debug!("创建跟踪对象 {}", self.spawned);
    LogTracklet {
      id: self.spawned,
      enabled: false,
      label: None,
      aux_score: 0,
      position: Point3::origin(),
      rotation: UnitQuaternion::identity(),
      size: Vector2::zeros(),
    }
  }
}
