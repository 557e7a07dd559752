// 该文件是 Tracklet （影踪） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

#![allow(dead_code)]

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector2, Vector3};

use tracklet::{
  camera::{CameraId, CameraIntrinsics, CameraProjection},
  config::TrackingConfig,
  detection::{Detection, DetectionBatch},
  geometry::BBox,
  surface::{SpatialSurface, SurfaceHit},
  tracking::{GroupingEngine, Tracklet, TrackletFactory},
};

/// 屏幕坐标 (x, y) 映射到世界 (100x, depth, 100y)
pub struct TestProjection;

impl CameraProjection for TestProjection {
  fn unproject(&self, _camera: CameraId, xy: Vector2<f32>, depth: f32) -> Point3<f32> {
    Point3::new(xy.x * 100.0, depth, xy.y * 100.0)
  }

  fn intrinsics(&self, _camera: CameraId) -> CameraIntrinsics {
    CameraIntrinsics::new(Vector2::new(100.0, 100.0), Vector2::new(100.0, 100.0))
  }

  fn near(&self) -> f32 {
    1.0
  }

  fn far(&self) -> f32 {
    100.0
  }
}

/// 命中点为射线起点在 y = 0 平面上的投影
pub struct FloorSurface;

impl SpatialSurface for FloorSurface {
  fn hit_test(&self, start: &Point3<f32>, _end: &Point3<f32>) -> Option<SurfaceHit> {
    Some(SurfaceHit {
      position: Point3::new(start.x, 0.0, start.z),
      normal: Vector3::y(),
    })
  }
}

pub struct NoSurface;

impl SpatialSurface for NoSurface {
  fn hit_test(&self, _start: &Point3<f32>, _end: &Point3<f32>) -> Option<SurfaceHit> {
    None
  }
}

#[derive(Debug)]
pub struct TestTracklet {
  pub serial: usize,
  pub enabled: bool,
  pub label: Option<String>,
  pub aux_score: i32,
  pub position: Point3<f32>,
  pub rotation: UnitQuaternion<f32>,
  pub size: Vector2<f32>,
  pub refreshed: usize,
}

impl Tracklet for TestTracklet {
  fn set_data(&mut self, label: &str, aux_score: i32) {
    self.label = Some(label.to_string());
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
    self.refreshed += 1;
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
    self.refreshed = 0;
  }
}

#[derive(Default)]
pub struct TestFactory {
  pub spawned: usize,
}

impl TrackletFactory for TestFactory {
  type Tracklet = TestTracklet;

  fn instantiate(&mut self) -> TestTracklet {
    self.spawned += 1;
    TestTracklet {
      serial: self.spawned,
      enabled: false,
      label: None,
      aux_score: 0,
      position: Point3::origin(),
      rotation: UnitQuaternion::identity(),
      size: Vector2::zeros(),
      refreshed: 0,
    }
  }
}

/// 屏幕坐标 (cx, cy) 的检测，落在世界坐标 (100cx, 0, 100cy)
pub fn detection(label: &str, cx: f32, cy: f32) -> Detection {
  Detection {
    label: label.to_string(),
    confidence: 0.9,
    bbox: BBox::new(cx, cy, 0.1, 0.2),
    aux_score: label.len() as i32,
  }
}

pub fn batch(detections: Vec<Detection>) -> DetectionBatch {
  DetectionBatch {
    camera: CameraId::Left,
    pose: Isometry3::identity(),
    detections,
  }
}

pub fn engine(config: TrackingConfig) -> GroupingEngine<TestFactory> {
  GroupingEngine::new(config, TestFactory::default())
}

pub fn window_config(detection_window: usize, consensus_fraction: f32) -> TrackingConfig {
  TrackingConfig {
    detection_window,
    consensus_fraction,
    ..Default::default()
  }
}
