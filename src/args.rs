// 该文件是 Tracklet （影踪） 项目的一部分。
// src/args.rs - 回放程序参数配置与管线组装
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  config::{Config, GroupingMode},
  controller::DetectionController,
  label::LabelTable,
  model::{Yolo7, Yolo7Builder},
  pipeline::TrackingPipeline,
  replay::{LogTrackletFactory, PinholeProjection, PlaneSurface, ReplayEngine, ReplayFile},
  task::HostFrame,
  tracking::GroupingEngine,
};

pub type ReplayPipeline =
  TrackingPipeline<ReplayEngine, Yolo7, LogTrackletFactory, PinholeProjection, PlaneSurface>;

/// 回放程序公共参数
#[derive(Args, Debug)]
pub struct ReplayArgs {
  /// 模型配置，例如 yolov7:///path/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 标签表，例如 labels:///path/labels.json
  #[arg(long, value_name = "LABELS")]
  pub labels: Url,

  /// 回放文件，例如 replay:///path/frames.jsonl
  #[arg(long, value_name = "REPLAY")]
  pub replay: Url,

  /// 运行参数 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub score_threshold: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou_threshold: Option<f32>,

  /// 归组半径
  #[arg(long, value_name = "DISTANCE")]
  pub grouping_distance: Option<f32>,

  /// 滑动窗口容量
  #[arg(long, value_name = "COUNT")]
  pub detection_window: Option<usize>,

  /// 共识比例 (0.0 - 1.0)
  #[arg(long, value_name = "FRACTION")]
  pub consensus_fraction: Option<f32>,

  /// 同时使用右相机
  #[arg(long)]
  pub stereo: bool,

  /// 开启记忆模式
  #[arg(long)]
  pub memory: bool,

  /// 逐帧显示，不做跨帧分组
  #[arg(long)]
  pub per_frame: bool,
}

impl ReplayArgs {
  /// 读取配置文件并应用命令行覆盖项
  pub fn load_config(&self) -> Result<Config> {
    let mut config = match &self.config {
      Some(path) => Config::from_path(path)
        .with_context(|| format!("无法加载运行配置 {}", path.display()))?,
      None => Config::default(),
    };

    if let Some(v) = self.score_threshold {
      config.detector.score_threshold = v;
    }
    if let Some(v) = self.iou_threshold {
      config.detector.iou_threshold = v;
    }
    if let Some(v) = self.grouping_distance {
      config.tracking.grouping_distance = v;
    }
    if let Some(v) = self.detection_window {
      config.tracking.detection_window = v;
    }
    if let Some(v) = self.consensus_fraction {
      config.tracking.consensus_fraction = v;
    }
    if self.memory {
      config.tracking.memory_mode = true;
    }
    if self.per_frame {
      config.tracking.grouping = GroupingMode::PerFrame;
    }

    config.validate().context("运行配置无效")?;
    Ok(config)
  }

  /// 加载模型、标签与回放文件并组装管线
  pub fn build(&self) -> Result<(ReplayPipeline, Vec<HostFrame>)> {
    info!("模型配置: {}", self.model);
    info!("标签表: {}", self.labels);
    info!("回放文件: {}", self.replay);

    let config = self.load_config()?;
    let labels = LabelTable::from_url(&self.labels).context("无法加载标签表")?;
    let replay = ReplayFile::from_url(&self.replay).context("无法加载回放文件")?;
    let (header, frames) = replay.into_parts();

    let model = Yolo7Builder::from_url(&self.model)?
      .num_classes(labels.len())
      .head_shapes(&header.head_shapes)
      .build()
      .context("无法加载模型")?;

    let controller =
      DetectionController::new(ReplayEngine::default(), model, labels, config.detector)
        .context("检测参数无效")?;
    let engine = GroupingEngine::new(config.tracking, LogTrackletFactory::default());
    let pipeline = TrackingPipeline::new(controller, engine, header.projection, header.surface);

    Ok((pipeline, frames.collect()))
  }
}
