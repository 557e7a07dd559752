// 该文件是 Tracklet （影踪） 项目的一部分。
// src/tracking/pool.rs - 跟踪对象句柄与对象池
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use nalgebra::{Point3, UnitQuaternion};
use tracing::debug;

/// 由外部渲染器实现的跟踪对象
pub trait Tracklet {
  fn set_data(&mut self, label: &str, aux_score: i32);

  /// 世界坐标位置、朝向与绝对宽高
  fn set_pose(
    &mut self,
    position: Point3<f32>,
    rotation: UnitQuaternion<f32>,
    width: f32,
    height: f32,
  );

  fn refresh_appearance(&mut self);

  fn set_enabled(&mut self, enabled: bool);

  fn is_enabled(&self) -> bool;

  /// 清除数据，回到刚创建时的状态
  fn reset(&mut self);
}

pub trait TrackletFactory {
  type Tracklet: Tracklet;

  fn instantiate(&mut self) -> Self::Tracklet;
}

/// 跟踪对象池
///
/// 句柄按值移交给分组，同一时刻只能属于一个分组；
/// 有空闲句柄时不会创建新句柄。
pub struct TrackletPool<F: TrackletFactory> {
  factory: F,
  free: Vec<F::Tracklet>,
  spawned: usize,
}

impl<F: TrackletFactory> TrackletPool<F> {
  pub fn new(factory: F) -> Self {
    Self {
      factory,
      free: Vec::new(),
      spawned: 0,
    }
  }

  /// 取出一个已启用的句柄，池为空时新建
  pub fn acquire(&mut self) -> F::Tracklet {
    let mut tracklet = match self.free.pop() {
      Some(tracklet) => tracklet,
      None => {
        self.spawned += 1;
        debug!("对象池为空, 新建跟踪对象 (共 {} 个)", self.spawned);
        self.factory.instantiate()
      }
    };
    tracklet.set_enabled(true);
    tracklet
  }

  /// 重置并禁用句柄后放回池中
  pub fn release(&mut self, mut tracklet: F::Tracklet) {
    tracklet.reset();
    tracklet.set_enabled(false);
    self.free.push(tracklet);
  }

  /// 累计创建的句柄数量
  pub fn spawned(&self) -> usize {
    self.spawned
  }

  /// 空闲句柄数量
  pub fn available(&self) -> usize {
    self.free.len()
  }

  pub fn factory(&self) -> &F {
    &self.factory
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Default)]
  struct Dummy {
    serial: usize,
    enabled: bool,
    label: Option<String>,
  }

  impl Tracklet for Dummy {
    fn set_data(&mut self, label: &str, _aux_score: i32) {
      self.label = Some(label.to_string());
    }

    fn set_pose(&mut self, _: Point3<f32>, _: UnitQuaternion<f32>, _: f32, _: f32) {}

    fn refresh_appearance(&mut self) {}

    fn set_enabled(&mut self, enabled: bool) {
      self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
      self.enabled
    }

    fn reset(&mut self) {
      self.label = None;
    }
  }

  #[derive(Default)]
  struct DummyFactory {
    serial: usize,
  }

  impl TrackletFactory for DummyFactory {
    type Tracklet = Dummy;

    fn instantiate(&mut self) -> Dummy {
      self.serial += 1;
      Dummy {
        serial: self.serial,
        ..Default::default()
      }
    }
  }

  #[test]
  fn test_reuse_before_spawn() {
    let mut pool = TrackletPool::new(DummyFactory::default());
    let mut a = pool.acquire();
    assert!(a.is_enabled());
    a.set_data("apple", 0);
    let _b = pool.acquire();
    assert_eq!(pool.spawned(), 2);

    pool.release(a);
    assert_eq!(pool.available(), 1);

    let c = pool.acquire();
    assert_eq!(c.serial, 1);
    assert!(c.label.is_none());
    assert!(c.is_enabled());
    assert_eq!(pool.spawned(), 2);
    assert_eq!(pool.factory().serial, 2);
  }
}
