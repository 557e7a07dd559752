// 该文件是 Tracklet （影踪） 项目的一部分。
// src/config.rs - 模型、检测与跟踪参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("{name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("{name} 必须为正数, 实际为 {value}")]
  NotPositive { name: &'static str, value: f32 },
  #[error("{0} 不能为 0")]
  Zero(&'static str),
  #[error("模型没有检测头")]
  NoHeads,
  #[error("检测头 {0} 没有锚框")]
  NoAnchors(usize),
  #[error("检测头 {head} 的锚框数量为 {actual}, 与第一个检测头的 {expected} 不一致")]
  AnchorCountMismatch {
    head: usize,
    expected: usize,
    actual: usize,
  },
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(ConfigError::NotPositive { name, value })
  }
}

/// 单个检测头：步长与该头的锚框 (宽, 高)，单位为模型输入像素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
  pub stride: f32,
  pub anchors: Vec<[f32; 2]>,
}

/// 多检测头锚框模型的静态描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  pub input_width: f32,
  pub input_height: f32,
  pub heads: Vec<HeadConfig>,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      input_width: 640.0,
      input_height: 640.0,
      heads: vec![
        HeadConfig {
          stride: 16.0,
          anchors: vec![[144.0, 300.0], [304.0, 220.0], [288.0, 584.0]],
        },
        HeadConfig {
          stride: 32.0,
          anchors: vec![[568.0, 440.0], [768.0, 972.0], [1836.0, 1604.0]],
        },
        HeadConfig {
          stride: 8.0,
          anchors: vec![[48.0, 64.0], [76.0, 144.0], [160.0, 112.0]],
        },
      ],
    }
  }
}

impl ModelConfig {
  /// 每个检测头的锚框数量（校验后各头一致）
  pub fn num_anchors(&self) -> usize {
    self.heads.first().map_or(0, |h| h.anchors.len())
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_positive("input_width", self.input_width)?;
    check_positive("input_height", self.input_height)?;

    let first = self.heads.first().ok_or(ConfigError::NoHeads)?;
    let expected = first.anchors.len();
    for (head, cfg) in self.heads.iter().enumerate() {
      check_positive("stride", cfg.stride)?;
      if cfg.anchors.is_empty() {
        return Err(ConfigError::NoAnchors(head));
      }
      if cfg.anchors.len() != expected {
        return Err(ConfigError::AnchorCountMismatch {
          head,
          expected,
          actual: cfg.anchors.len(),
        });
      }
      for anchor in &cfg.anchors {
        check_positive("anchor", anchor[0])?;
        check_positive("anchor", anchor[1])?;
      }
    }
    Ok(())
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载模型配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }
}

/// 解码与 NMS 参数，以及推理延迟修正
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub score_threshold: f32,
  pub iou_threshold: f32,
  /// 是否用发起推理时的相机位姿修正延迟
  pub fix_latency: bool,
  /// 位姿缓冲区容量
  pub latency_window: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.4,
      iou_threshold: 0.65,
      fix_latency: true,
      latency_window: 5,
    }
  }
}

impl DetectorConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    check_unit("score_threshold", self.score_threshold)?;
    check_unit("iou_threshold", self.iou_threshold)?;
    if self.latency_window == 0 {
      return Err(ConfigError::Zero("latency_window"));
    }
    Ok(())
  }
}

/// 检测分组方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
  /// 跨帧分组 + 滑动窗口共识
  #[default]
  Temporal,
  /// 不做时间记忆，每帧独立显示
  PerFrame,
}

/// 新检测归入已有分组的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachPolicy {
  /// 按分组创建顺序，取第一个距离足够近的分组
  #[default]
  FirstMatch,
  /// 取距离最近的分组
  Nearest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
  /// 世界坐标下的归组半径
  pub grouping_distance: f32,
  /// 单相机时的滑动窗口容量，双相机时翻倍
  pub detection_window: usize,
  /// 显示跟踪对象所需的同标签占比
  pub consensus_fraction: f32,
  /// 记忆模式：达到共识的分组在缺少新观测时保留历史
  pub memory_mode: bool,
  pub grouping: GroupingMode,
  pub attach_policy: AttachPolicy,
  /// 绝对尺寸换算的经验修正系数
  pub depth_scaling_correction: f32,
}

impl Default for TrackingConfig {
  fn default() -> Self {
    Self {
      grouping_distance: 10.0,
      detection_window: 10,
      consensus_fraction: 0.7,
      memory_mode: false,
      grouping: GroupingMode::Temporal,
      attach_policy: AttachPolicy::FirstMatch,
      depth_scaling_correction: 0.85,
    }
  }
}

impl TrackingConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    check_positive("grouping_distance", self.grouping_distance)?;
    check_unit("consensus_fraction", self.consensus_fraction)?;
    check_positive("depth_scaling_correction", self.depth_scaling_correction)?;
    if self.detection_window == 0 {
      return Err(ConfigError::Zero("detection_window"));
    }
    Ok(())
  }
}

/// 运行参数总配置（JSON 文件）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub detector: DetectorConfig,
  pub tracking: TrackingConfig,
}

impl Config {
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.detector.validate()?;
    self.tracking.validate()
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载运行配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json(&text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_default() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.tracking.detection_window, 10);
    assert_eq!(config.detector.latency_window, 5);

    let model = ModelConfig::default();
    assert!(model.validate().is_ok());
    assert_eq!(model.heads.len(), 3);
    assert_eq!(model.num_anchors(), 3);
  }

  #[test]
  fn test_partial_json_uses_defaults() {
    let config = Config::from_json(
      r#"{"tracking": {"memory_mode": true, "grouping": "per_frame"}, "detector": {"score_threshold": 0.25}}"#,
    )
    .unwrap();
    assert!(config.tracking.memory_mode);
    assert_eq!(config.tracking.grouping, GroupingMode::PerFrame);
    assert_eq!(config.tracking.attach_policy, AttachPolicy::FirstMatch);
    assert_eq!(config.detector.score_threshold, 0.25);
    assert_eq!(config.detector.iou_threshold, 0.65);
  }

  #[test]
  fn test_invalid_values_are_rejected() {
    assert!(matches!(
      Config::from_json(r#"{"detector": {"iou_threshold": 1.5}}"#),
      Err(ConfigError::ThresholdOutOfRange { .. })
    ));
    assert!(matches!(
      Config::from_json(r#"{"tracking": {"detection_window": 0}}"#),
      Err(ConfigError::Zero("detection_window"))
    ));
    assert!(matches!(
      Config::from_json(r#"{"tracking": {"grouping_distance": -1.0}}"#),
      Err(ConfigError::NotPositive { .. })
    ));
  }

  #[test]
  fn test_model_anchor_mismatch() {
    let mut model = ModelConfig::default();
    model.heads[1].anchors.pop();
    assert!(matches!(
      model.validate(),
      Err(ConfigError::AnchorCountMismatch {
        head: 1,
        expected: 3,
        actual: 2
      })
    ));

    model.heads.clear();
    assert!(matches!(model.validate(), Err(ConfigError::NoHeads)));
  }
}
