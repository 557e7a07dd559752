// 该文件是 Tracklet （影踪） 项目的一部分。
// src/bin/replay_oneshot.rs - 回放指定帧数的推理结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tracklet::{
  args::ReplayArgs,
  task::{OneShotTask, Task},
  tracking::DetectionGroup,
};

/// Tracklet 单次运行回放
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub replay: ReplayArgs,

  /// 推理次数，用完后自动停止
  #[arg(long, default_value = "10", value_name = "COUNT")]
  pub frames: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let (mut pipeline, frames) = args.replay.build()?;
  let detections = pipeline.subscribe();

  OneShotTask::new(args.replay.stereo, args.frames).run_task(frames.into_iter(), &mut pipeline)?;

  let batches = detections.try_iter().count();
  info!("共收到 {} 个检测批次", batches);
  for group in pipeline.engine().groups() {
    report(group);
  }

  Ok(())
}

fn report<T>(group: &DetectionGroup<T>) {
  let position = group.position();
  info!(
    "分组 {}: {} ({}/{}), 位置 ({:.1}, {:.1}, {:.1}), {}",
    group.id(),
    group.label(),
    group.label_count(),
    group.len(),
    position.x,
    position.y,
    position.z,
    if group.tracklet().is_some() {
      "已显示"
    } else {
      "未显示"
    }
  );
}
