// 该文件是 Tracklet （影踪） 项目的一部分。
// src/bin/replay_continuous.rs - 连续回放推理结果
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
  task::{ContinuousTask, Task},
};

/// Tracklet 连续回放
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub replay: ReplayArgs,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let (mut pipeline, frames) = args.replay.build()?;

  ContinuousTask::default()
    .with_second_camera(args.replay.stereo)
    .with_frame_number(args.frame_number)
    .run_task(frames.into_iter(), &mut pipeline)?;

  pipeline.engine_mut().refresh_appearance_all();
  info!(
    "剩余 {} 个分组, {} 个跟踪对象, 共创建 {} 个跟踪对象",
    pipeline.engine().groups().len(),
    pipeline.engine().active_count(),
    pipeline.engine().pool().spawned()
  );

  Ok(())
}
