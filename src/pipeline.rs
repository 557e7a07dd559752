// 该文件是 Tracklet （影踪） 项目的一部分。
// src/pipeline.rs - 检测控制器到分组引擎的同步管线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt::Display;
use std::sync::mpsc::{Receiver, Sender, channel};

use tracing::trace;

use crate::{
  camera::{CameraId, CameraPose, CameraProjection},
  controller::DetectionController,
  detection::DetectionBatch,
  inference::InferenceEngine,
  model::{CandidateBox, Model, RawHeadOutput},
  surface::SpatialSurface,
  tracking::{GroupingEngine, TrackletFactory},
};

/// 跟踪管线
///
/// 在同一线程内按顺序执行：推理结果 -> 检测批次 -> 订阅者通知 -> 分组更新。
pub struct TrackingPipeline<E, M, F: TrackletFactory, P, S> {
  controller: DetectionController<E, M>,
  engine: GroupingEngine<F>,
  projection: P,
  surface: S,
  subscribers: Vec<Sender<DetectionBatch>>,
}

impl<E, M, F, P, S> TrackingPipeline<E, M, F, P, S>
where
  E: InferenceEngine,
  M: Model<Output = Vec<CandidateBox>>,
  M::Error: Display,
  F: TrackletFactory,
  P: CameraProjection,
  S: SpatialSurface,
{
  pub fn new(
    controller: DetectionController<E, M>,
    engine: GroupingEngine<F>,
    projection: P,
    surface: S,
  ) -> Self {
    Self {
      controller,
      engine,
      projection,
      surface,
      subscribers: Vec::new(),
    }
  }

  pub fn controller(&self) -> &DetectionController<E, M> {
    &self.controller
  }

  pub fn controller_mut(&mut self) -> &mut DetectionController<E, M> {
    &mut self.controller
  }

  pub fn engine(&self) -> &GroupingEngine<F> {
    &self.engine
  }

  pub fn engine_mut(&mut self) -> &mut GroupingEngine<F> {
    &mut self.engine
  }

  pub fn projection(&self) -> &P {
    &self.projection
  }

  pub fn surface(&self) -> &S {
    &self.surface
  }

  /// 订阅每次推理回调产生的检测批次
  pub fn subscribe(&mut self) -> Receiver<DetectionBatch> {
    let (tx, rx) = channel();
    self.subscribers.push(tx);
    rx
  }

  pub fn run_once(&mut self, use_second: bool, frames: usize) -> bool {
    let started = self.controller.run_once(use_second, frames);
    if started {
      self.engine.set_stereo(use_second);
    }
    started
  }

  pub fn start_continuous(&mut self, use_second: bool) -> bool {
    let started = self.controller.start_continuous(use_second);
    if started {
      self.engine.set_stereo(use_second);
    }
    started
  }

  pub fn stop_continuous(&mut self) {
    self.controller.stop_continuous();
  }

  pub fn on_frame(&mut self, current_pose: &CameraPose) {
    self.controller.on_frame(current_pose);
  }

  /// 推理完成回调，返回是否产生了检测批次
  pub fn on_inference_finished(
    &mut self,
    camera: CameraId,
    outputs: &[RawHeadOutput],
    current_pose: &CameraPose,
  ) -> bool {
    let Some(batch) = self
      .controller
      .on_inference_finished(camera, outputs, current_pose)
    else {
      return false;
    };

    // 接收端已释放的订阅者直接移除
    self
      .subscribers
      .retain(|tx| tx.send(batch.clone()).is_ok());
    trace!("检测批次已通知 {} 个订阅者", self.subscribers.len());

    self.engine.update(&batch, &self.projection, &self.surface);
    true
  }
}
