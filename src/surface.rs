// 该文件是 Tracklet （影踪） 项目的一部分。
// src/surface.rs - 空间表面命中检测接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use nalgebra::{Point3, Vector3};

/// 射线与世界表面的交点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
  pub position: Point3<f32>,
  pub normal: Vector3<f32>,
}

/// 空间表面服务
pub trait SpatialSurface {
  /// 对线段 `start -> end` 做命中检测，未命中时返回 `None`
  fn hit_test(&self, start: &Point3<f32>, end: &Point3<f32>) -> Option<SurfaceHit>;
}
