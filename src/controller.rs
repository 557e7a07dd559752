// 该文件是 Tracklet （影踪） 项目的一部分。
// src/controller.rs - 检测控制器：推理调度、延迟修正与结果解析
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt::Display;

use tracing::{debug, error, info, warn};

use crate::{
  camera::{CameraId, CameraPose, PoseBuffer},
  config::{ConfigError, DetectorConfig},
  detection::{DetectionBatch, build_detections},
  inference::InferenceEngine,
  label::LabelTable,
  model::{CandidateBox, Model, RawHeadOutput},
  nms::non_max_suppression,
};

/// 检测控制器
///
/// 管理左右两路推理的启停与计数，推理完成时依次执行解码、NMS
/// 与检测构建，并为结果配对发起推理时的相机位姿。
pub struct DetectionController<E, M> {
  engine: E,
  model: M,
  labels: LabelTable,
  config: DetectorConfig,
  poses: PoseBuffer,
  use_second: bool,
  running: bool,
  // None 表示不限次数
  remaining: Option<usize>,
}

impl<E, M> DetectionController<E, M>
where
  E: InferenceEngine,
  M: Model<Output = Vec<CandidateBox>>,
  M::Error: Display,
{
  pub fn new(
    engine: E,
    model: M,
    labels: LabelTable,
    config: DetectorConfig,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let poses = PoseBuffer::new(config.latency_window);
    Ok(Self {
      engine,
      model,
      labels,
      config,
      poses,
      use_second: false,
      running: false,
      remaining: None,
    })
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn engine_mut(&mut self) -> &mut E {
    &mut self.engine
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn set_score_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
    let mut config = self.config.clone();
    config.score_threshold = threshold;
    config.validate()?;
    self.config = config;
    Ok(())
  }

  pub fn set_iou_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
    let mut config = self.config.clone();
    config.iou_threshold = threshold;
    config.validate()?;
    self.config = config;
    Ok(())
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  /// 是否同时使用右相机
  pub fn is_stereo(&self) -> bool {
    self.running && self.use_second
  }

  /// 剩余推理次数，`None` 表示持续运行
  pub fn remaining(&self) -> Option<usize> {
    self.remaining
  }

  fn engines_idle(&self, use_second: bool) -> bool {
    self.engine.is_idle(CameraId::Left) && (!use_second || self.engine.is_idle(CameraId::Right))
  }

  /// 运行指定次数的推理后自动停止
  pub fn run_once(&mut self, use_second: bool, frames: usize) -> bool {
    if !self.engines_idle(use_second) {
      warn!("推理引擎忙, 忽略单次运行请求");
      return false;
    }
    info!("单次运行: {} 帧", frames);
    self.remaining = Some(frames);
    self.start_continuous(use_second)
  }

  pub fn start_continuous(&mut self, use_second: bool) -> bool {
    if !self.engines_idle(use_second) {
      warn!("推理引擎忙, 忽略启动请求");
      return false;
    }

    if self.config.fix_latency {
      self.poses.set_window(self.config.latency_window);
      self.poses.start();
    }

    self.use_second = use_second;
    self.running = true;
    self.engine.run_scheduled(CameraId::Left);
    if use_second {
      self.engine.run_scheduled(CameraId::Right);
    }
    info!("开始连续推理 (双目: {})", use_second);
    true
  }

  /// 停止推理并清空位姿缓冲区，不影响已有分组
  pub fn stop_continuous(&mut self) {
    self.engine.cancel(CameraId::Left);
    self.engine.cancel(CameraId::Right);
    self.poses.stop();
    self.running = false;
    info!("停止推理");
  }

  /// 每帧调用，记录当前相机位姿
  pub fn on_frame(&mut self, current_pose: &CameraPose) {
    if self.config.fix_latency {
      self.poses.record(*current_pose);
    }
  }

  /// 推理完成回调
  ///
  /// 计数归零后到达的结果会停止推理并被丢弃；解码失败时记录错误并丢弃该帧。
  pub fn on_inference_finished(
    &mut self,
    camera: CameraId,
    outputs: &[RawHeadOutput],
    current_pose: &CameraPose,
  ) -> Option<DetectionBatch> {
    match self.remaining {
      Some(0) => {
        self.remaining = None;
        debug!("推理次数已用完");
        self.stop_continuous();
        return None;
      }
      Some(n) => self.remaining = Some(n - 1),
      None => {}
    }

    let pose = if self.config.fix_latency {
      self.poses.take(camera, current_pose)
    } else {
      *current_pose
    };

    let candidates = match self.model.postprocess(outputs, self.config.score_threshold) {
      Ok(candidates) => candidates,
      Err(e) => {
        error!("{}推理结果解码失败: {}", camera, e);
        return None;
      }
    };

    let kept = non_max_suppression(
      candidates,
      self.config.iou_threshold,
      self.config.score_threshold,
    );
    let detections = build_detections(&kept, &self.labels);
    debug!("{}: {} 个检测结果", camera, detections.len());

    Some(DetectionBatch {
      camera,
      pose,
      detections,
    })
  }
}
