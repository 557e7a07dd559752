// 该文件是 Tracklet （影踪） 项目的一部分。
// src/task.rs - 逐帧驱动跟踪管线的任务
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt::Display;
use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  camera::{CameraId, CameraPose, CameraProjection},
  inference::InferenceEngine,
  model::{CandidateBox, Model, RawHeadOutput},
  pipeline::TrackingPipeline,
  surface::SpatialSurface,
  tracking::TrackletFactory,
};

/// 宿主的一帧：当前相机位姿与本帧完成的推理结果
#[derive(Debug, Clone, PartialEq)]
pub struct HostFrame {
  pub pose: CameraPose,
  pub results: Vec<(CameraId, Vec<RawHeadOutput>)>,
}

pub trait Task<I, T>: Sized {
  type Error;
  fn run_task(self, input: I, target: &mut T) -> Result<(), Self::Error>;
}

/// 推送一帧，返回本帧产生的检测批次数量；空闲相机的结果被忽略
fn pump_frame<E, M, F, P, S>(
  pipeline: &mut TrackingPipeline<E, M, F, P, S>,
  frame: &HostFrame,
) -> usize
where
  E: InferenceEngine,
  M: Model<Output = Vec<CandidateBox>>,
  M::Error: Display,
  F: TrackletFactory,
  P: CameraProjection,
  S: SpatialSurface,
{
  pipeline.on_frame(&frame.pose);

  let mut batches = 0;
  for (camera, outputs) in &frame.results {
    if pipeline.controller().engine().is_idle(*camera) {
      continue;
    }
    if pipeline.on_inference_finished(*camera, outputs, &frame.pose) {
      batches += 1;
    }
  }
  batches
}

/// 运行指定次数的推理，计数用完后自动停止
#[derive(Debug)]
pub struct OneShotTask {
  use_second: bool,
  frames: usize,
}

impl OneShotTask {
  pub fn new(use_second: bool, frames: usize) -> Self {
    Self { use_second, frames }
  }
}

impl<I, E, M, F, P, S> Task<I, TrackingPipeline<E, M, F, P, S>> for OneShotTask
where
  I: Iterator<Item = HostFrame>,
  E: InferenceEngine,
  M: Model<Output = Vec<CandidateBox>>,
  M::Error: Display,
  F: TrackletFactory,
  P: CameraProjection,
  S: SpatialSurface,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &mut TrackingPipeline<E, M, F, P, S>,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    if !pipeline.run_once(self.use_second, self.frames) {
      anyhow::bail!("推理引擎忙, 无法开始单次运行");
    }

    let now = std::time::Instant::now();
    let mut frame_index = 0;
    for frame in input {
      frame_index += 1;
      let batches = pump_frame(pipeline, &frame);
      info!(
        "第 {} 帧: {} 个检测批次, {} 个跟踪对象",
        frame_index,
        batches,
        pipeline.engine().active_count()
      );
      if !pipeline.controller().is_running() {
        break;
      }
    }

    if pipeline.controller().is_running() {
      warn!("输入帧已耗尽, 推理计数未用完");
      pipeline.stop_continuous();
    }
    info!("任务完成，耗时: {:.2?}", now.elapsed());
    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  use_second: bool,
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_second_camera(mut self, use_second: bool) -> Self {
    self.use_second = use_second;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I, E, M, F, P, S> Task<I, TrackingPipeline<E, M, F, P, S>> for ContinuousTask
where
  I: Iterator<Item = HostFrame>,
  E: InferenceEngine,
  M: Model<Output = Vec<CandidateBox>>,
  M::Error: Display,
  F: TrackletFactory,
  P: CameraProjection,
  S: SpatialSurface,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: &mut TrackingPipeline<E, M, F, P, S>,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;

    if !pipeline.start_continuous(self.use_second) {
      anyhow::bail!("推理引擎忙, 无法开始连续推理");
    }

    let mut frame_index = 0;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index += 1;
      let batches = pump_frame(pipeline, &frame);
      info!(
        "第 {} 帧: {} 个检测批次, {} 个分组, {} 个跟踪对象, 耗时: {:.2?}",
        frame_index,
        batches,
        pipeline.engine().groups().len(),
        pipeline.engine().active_count(),
        now.elapsed()
      );
      now = std::time::Instant::now();

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    pipeline.stop_continuous();
    info!("任务完成，退出");
    Ok(())
  }
}
