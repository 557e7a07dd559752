// 该文件是 Tracklet （影踪） 项目的一部分。
// src/tracking/engine.rs - 时空分组引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use tracing::{debug, info, trace};

use crate::{
  camera::{CameraId, CameraIntrinsics, CameraPose, CameraProjection},
  config::{AttachPolicy, GroupingMode, TrackingConfig},
  detection::{Detection, DetectionBatch},
  surface::{SpatialSurface, SurfaceHit},
  tracking::{
    group::{DetectionGroup, Observation},
    pool::{Tracklet, TrackletFactory, TrackletPool},
  },
};

const CONSENSUS_TOLERANCE: f64 = 1e-6;

/// 以表面法向为上方向、世界上方向在表面上的投影为前方向的朝向
pub fn surface_rotation(normal: &Vector3<f32>) -> UnitQuaternion<f32> {
  let Some(n) = normal.try_normalize(f32::EPSILON) else {
    return UnitQuaternion::identity();
  };
  let on_plane = |v: Vector3<f32>| v - n * v.dot(&n);

  let forward = on_plane(Vector3::y());
  let forward = if forward.norm_squared() > 1e-6 {
    forward
  } else {
    // 水平表面上改用世界前方向
    on_plane(Vector3::z())
  };
  UnitQuaternion::face_towards(&forward, &n)
}

/// 向跟踪对象推送一次位姿、尺寸与标签
struct TrackletUpdate<'a> {
  position: Point3<f32>,
  normal: Vector3<f32>,
  dimensions: Vector2<f32>,
  label: &'a str,
  aux_score: i32,
}

impl TrackletUpdate<'_> {
  fn apply<T: Tracklet>(
    &self,
    tracklet: &mut T,
    pose: &CameraPose,
    intrinsics: &CameraIntrinsics,
    correction: f32,
  ) {
    let rotation = surface_rotation(&self.normal);
    let depth = pose.inverse_transform_point(&self.position).z.abs();
    let size = intrinsics.norm_to_absolute(self.dimensions, depth, correction);

    tracklet.set_enabled(true);
    tracklet.set_data(self.label, self.aux_score);
    tracklet.set_pose(self.position, rotation, size.x, size.y);
    tracklet.refresh_appearance();
  }
}

/// 时空分组引擎
///
/// 将各相机的检测批次按世界坐标距离归入分组，维护滑动窗口统计，
/// 并按共识比例为分组分配或回收跟踪对象。
pub struct GroupingEngine<F: TrackletFactory> {
  config: TrackingConfig,
  groups: Vec<DetectionGroup<F::Tracklet>>,
  frame_tracklets: Vec<F::Tracklet>,
  pool: TrackletPool<F>,
  stereo: bool,
  next_id: u64,
}

impl<F: TrackletFactory> GroupingEngine<F> {
  pub fn new(config: TrackingConfig, factory: F) -> Self {
    Self {
      config,
      groups: Vec::new(),
      frame_tracklets: Vec::new(),
      pool: TrackletPool::new(factory),
      stereo: false,
      next_id: 0,
    }
  }

  pub fn config(&self) -> &TrackingConfig {
    &self.config
  }

  pub fn config_mut(&mut self) -> &mut TrackingConfig {
    &mut self.config
  }

  pub fn set_memory_mode(&mut self, enabled: bool) {
    info!("记忆模式: {}", if enabled { "开启" } else { "关闭" });
    self.config.memory_mode = enabled;
  }

  /// 双相机同时运行时窗口容量翻倍
  pub fn set_stereo(&mut self, stereo: bool) {
    self.stereo = stereo;
  }

  pub fn is_stereo(&self) -> bool {
    self.stereo
  }

  pub fn effective_window(&self) -> usize {
    if self.stereo {
      self.config.detection_window * 2
    } else {
      self.config.detection_window
    }
  }

  /// 显示跟踪对象所需的最少同标签观测数，即 `ceil(fraction * W)`
  pub fn consensus_threshold(&self) -> usize {
    let exact = f64::from(self.config.consensus_fraction) * self.effective_window() as f64;
    // 消除 f32 比例的表示误差，0.6 * 25 应得 15 而非 16
    (exact * (1.0 - CONSENSUS_TOLERANCE)).ceil() as usize
  }

  pub fn groups(&self) -> &[DetectionGroup<F::Tracklet>] {
    &self.groups
  }

  /// 逐帧模式下当前显示的跟踪对象
  pub fn frame_tracklets(&self) -> &[F::Tracklet] {
    &self.frame_tracklets
  }

  pub fn pool(&self) -> &TrackletPool<F> {
    &self.pool
  }

  /// 当前已显示的跟踪对象数量
  pub fn active_count(&self) -> usize {
    self.groups.iter().filter(|g| g.tracklet().is_some()).count() + self.frame_tracklets.len()
  }

  /// 刷新所有已启用跟踪对象的外观
  pub fn refresh_appearance_all(&mut self) {
    let tracklets = self
      .groups
      .iter_mut()
      .filter_map(|g| g.tracklet_mut())
      .chain(self.frame_tracklets.iter_mut());
    for tracklet in tracklets {
      if tracklet.is_enabled() {
        tracklet.refresh_appearance();
      }
    }
  }

  /// 处理一个相机的检测批次
  pub fn update<P, S>(&mut self, batch: &DetectionBatch, projection: &P, surface: &S)
  where
    P: CameraProjection,
    S: SpatialSurface,
  {
    let intrinsics = projection
      .intrinsics(CameraId::Left)
      .fuse(&projection.intrinsics(CameraId::Right));

    match self.config.grouping {
      GroupingMode::Temporal => {
        self.release_frame_tracklets();
        self.update_temporal(batch, projection, surface, &intrinsics);
      }
      GroupingMode::PerFrame => {
        self.release_groups();
        self.update_per_frame(batch, projection, surface, &intrinsics);
      }
    }
  }

  fn locate<P, S>(
    detection: &Detection,
    batch: &DetectionBatch,
    projection: &P,
    surface: &S,
  ) -> Option<SurfaceHit>
  where
    P: CameraProjection,
    S: SpatialSurface,
  {
    let xy = Vector2::new(detection.bbox.cx, detection.bbox.cy);
    let start = projection.project(batch.camera, &batch.pose, xy, projection.near());
    let end = projection.project(batch.camera, &batch.pose, xy, projection.far());
    let hit = surface.hit_test(&start, &end);
    if hit.is_none() {
      trace!("{} 未命中表面, 丢弃", detection.label);
    }
    hit
  }

  fn find_group(&self, position: &Point3<f32>) -> Option<usize> {
    let distance = self.config.grouping_distance;
    let candidates = self
      .groups
      .iter()
      .enumerate()
      .map(|(idx, g)| (idx, nalgebra::distance(&g.position(), position)))
      .filter(|&(_, d)| d < distance);

    match self.config.attach_policy {
      AttachPolicy::FirstMatch => candidates.map(|(idx, _)| idx).next(),
      AttachPolicy::Nearest => candidates
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx),
    }
  }

  fn update_temporal<P, S>(
    &mut self,
    batch: &DetectionBatch,
    projection: &P,
    surface: &S,
    intrinsics: &CameraIntrinsics,
  ) where
    P: CameraProjection,
    S: SpatialSurface,
  {
    for detection in &batch.detections {
      let Some(hit) = Self::locate(detection, batch, projection, surface) else {
        continue;
      };

      let observation = Observation {
        label: detection.label.clone(),
        aux_score: detection.aux_score,
        position: hit.position,
        normal: hit.normal,
        dimensions: Vector2::new(detection.bbox.w, detection.bbox.h),
      };

      match self.find_group(&hit.position) {
        Some(idx) => {
          trace!("{} 归入分组 {}", detection.label, self.groups[idx].id());
          self.groups[idx].push(observation);
        }
        None => {
          let id = self.next_id;
          self.next_id += 1;
          trace!("{} 新建分组 {}", detection.label, id);
          self.groups.push(DetectionGroup::new(id, observation));
        }
      }
    }

    let window = self.effective_window();
    let threshold = self.consensus_threshold();
    let memory_mode = self.config.memory_mode;
    let correction = self.config.depth_scaling_correction;
    let pool = &mut self.pool;

    self.groups.retain_mut(|group| {
      // 窗口可能在运行中缩小，记忆模式下同样截断
      while group.len() > window {
        group.evict_oldest();
      }
      if !group.is_updated() && !(memory_mode && group.label_count() >= threshold) {
        group.evict_oldest();
      }
      group.clear_updated();

      if group.is_empty() {
        if let Some(tracklet) = group.take_tracklet() {
          info!("分组 {} 已清空, 回收跟踪对象", group.id());
          pool.release(tracklet);
        }
        trace!("删除分组 {}", group.id());
        return false;
      }

      if group.label_count() >= threshold {
        let mut tracklet = match group.take_tracklet() {
          Some(tracklet) => tracklet,
          None => {
            info!(
              "分组 {} 达成共识 {} ({}/{}), 显示跟踪对象",
              group.id(),
              group.label(),
              group.label_count(),
              window
            );
            pool.acquire()
          }
        };
        TrackletUpdate {
          position: group.position(),
          normal: group.normal(),
          dimensions: group.dimensions(),
          label: group.label(),
          aux_score: group.aux_score(),
        }
        .apply(&mut tracklet, &batch.pose, intrinsics, correction);
        group.attach_tracklet(tracklet);
      } else if let Some(tracklet) = group.take_tracklet() {
        info!(
          "分组 {} 共识不足 ({}/{}), 回收跟踪对象",
          group.id(),
          group.label_count(),
          window
        );
        pool.release(tracklet);
      }
      true
    });

    debug!(
      "{}: {} 个检测, {} 个分组, {} 个跟踪对象",
      batch.camera,
      batch.detections.len(),
      self.groups.len(),
      self.active_count()
    );
  }

  fn update_per_frame<P, S>(
    &mut self,
    batch: &DetectionBatch,
    projection: &P,
    surface: &S,
    intrinsics: &CameraIntrinsics,
  ) where
    P: CameraProjection,
    S: SpatialSurface,
  {
    self.release_frame_tracklets();

    for detection in &batch.detections {
      let Some(hit) = Self::locate(detection, batch, projection, surface) else {
        continue;
      };
      let update = TrackletUpdate {
        position: hit.position,
        normal: hit.normal,
        dimensions: Vector2::new(detection.bbox.w, detection.bbox.h),
        label: &detection.label,
        aux_score: detection.aux_score,
      };
      let mut tracklet = self.pool.acquire();
      update.apply(
        &mut tracklet,
        &batch.pose,
        intrinsics,
        self.config.depth_scaling_correction,
      );
      self.frame_tracklets.push(tracklet);
    }

    debug!(
      "{}: 逐帧显示 {} 个跟踪对象",
      batch.camera,
      self.frame_tracklets.len()
    );
  }

  fn release_frame_tracklets(&mut self) {
    for tracklet in self.frame_tracklets.drain(..) {
      self.pool.release(tracklet);
    }
  }

  fn release_groups(&mut self) {
    if self.groups.is_empty() {
      return;
    }
    debug!("切换为逐帧模式, 清除 {} 个分组", self.groups.len());
    for mut group in self.groups.drain(..) {
      if let Some(tracklet) = group.take_tracklet() {
        self.pool.release(tracklet);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_surface_rotation_on_floor() {
    let rotation = surface_rotation(&Vector3::y());
    assert!((rotation * Vector3::y() - Vector3::y()).norm() < 1e-5);
    assert!((rotation * Vector3::z() - Vector3::z()).norm() < 1e-5);
  }

  #[test]
  fn test_surface_rotation_on_wall() {
    // 法向指向 +z 的墙面：上方向映射为法向，前方向映射为世界上方向
    let rotation = surface_rotation(&Vector3::z());
    assert!((rotation * Vector3::y() - Vector3::z()).norm() < 1e-5);
    assert!((rotation * Vector3::z() - Vector3::y()).norm() < 1e-5);
  }

  #[test]
  fn test_surface_rotation_degenerate_normal() {
    assert_eq!(surface_rotation(&Vector3::zeros()), UnitQuaternion::identity());
  }
}
