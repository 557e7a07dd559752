// 该文件是 Tracklet （影踪） 项目的一部分。
// src/tracking/group.rs - 检测分组与滑动窗口统计
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::{BTreeMap, VecDeque};

use nalgebra::{Point3, Vector2, Vector3};

use crate::geometry::RunningMean;

/// 一次命中表面的检测观测
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
  pub label: String,
  pub aux_score: i32,
  pub position: Point3<f32>,
  pub normal: Vector3<f32>,
  /// 归一化边界框宽高
  pub dimensions: Vector2<f32>,
}

/// 跨帧持续存在的检测分组
///
/// 位置、法向与尺寸为 `history` 中全部观测的均值，
/// `label` 为历史中出现次数最多的标签，次数相同时取字典序最小者。
#[derive(Debug)]
pub struct DetectionGroup<T> {
  id: u64,
  history: VecDeque<Observation>,
  position: RunningMean<Vector3<f32>>,
  normal: RunningMean<Vector3<f32>>,
  dimensions: RunningMean<Vector2<f32>>,
  label_counts: BTreeMap<String, usize>,
  label: String,
  label_count: usize,
  updated: bool,
  tracklet: Option<T>,
}

impl<T> DetectionGroup<T> {
  /// 以第一个观测创建分组
  pub fn new(id: u64, observation: Observation) -> Self {
    let mut label_counts = BTreeMap::new();
    label_counts.insert(observation.label.clone(), 1);

    Self {
      id,
      position: RunningMean::new(observation.position.coords),
      normal: RunningMean::new(observation.normal),
      dimensions: RunningMean::new(observation.dimensions),
      label: observation.label.clone(),
      label_count: 1,
      label_counts,
      history: VecDeque::from([observation]),
      updated: true,
      tracklet: None,
    }
  }

  pub fn push(&mut self, observation: Observation) {
    self.updated = true;
    self.position.push(observation.position.coords);
    self.normal.push(observation.normal);
    self.dimensions.push(observation.dimensions);
    *self
      .label_counts
      .entry(observation.label.clone())
      .or_insert(0) += 1;
    self.history.push_back(observation);
    self.recount();
  }

  /// 移除最早的观测
  pub fn evict_oldest(&mut self) -> Option<Observation> {
    let observation = self.history.pop_front()?;
    self.position.pop(observation.position.coords);
    self.normal.pop(observation.normal);
    self.dimensions.pop(observation.dimensions);
    if let Some(count) = self.label_counts.get_mut(&observation.label) {
      *count -= 1;
      if *count == 0 {
        self.label_counts.remove(&observation.label);
      }
    }
    self.recount();
    Some(observation)
  }

  fn recount(&mut self) {
    let mut best: Option<(&String, usize)> = None;
    for (label, &count) in &self.label_counts {
      if best.is_none_or(|(_, c)| count > c) {
        best = Some((label, count));
      }
    }
    match best {
      Some((label, count)) => {
        if self.label != *label {
          self.label = label.clone();
        }
        self.label_count = count;
      }
      None => self.label_count = 0,
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  /// 窗口内观测数量
  pub fn len(&self) -> usize {
    self.history.len()
  }

  pub fn is_empty(&self) -> bool {
    self.history.is_empty()
  }

  pub fn history(&self) -> impl Iterator<Item = &Observation> {
    self.history.iter()
  }

  pub fn position(&self) -> Point3<f32> {
    Point3::from(self.position.mean())
  }

  pub fn normal(&self) -> Vector3<f32> {
    self.normal.mean()
  }

  pub fn dimensions(&self) -> Vector2<f32> {
    self.dimensions.mean()
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn label_count(&self) -> usize {
    self.label_count
  }

  /// 多数标签最近一次观测的附加评分
  pub fn aux_score(&self) -> i32 {
    self
      .history
      .iter()
      .rev()
      .find(|o| o.label == self.label)
      .map_or(0, |o| o.aux_score)
  }

  pub fn is_updated(&self) -> bool {
    self.updated
  }

  pub fn clear_updated(&mut self) {
    self.updated = false;
  }

  pub fn tracklet(&self) -> Option<&T> {
    self.tracklet.as_ref()
  }

  pub fn tracklet_mut(&mut self) -> Option<&mut T> {
    self.tracklet.as_mut()
  }

  pub fn attach_tracklet(&mut self, tracklet: T) {
    self.tracklet = Some(tracklet);
  }

  pub fn take_tracklet(&mut self) -> Option<T> {
    self.tracklet.take()
  }
}
