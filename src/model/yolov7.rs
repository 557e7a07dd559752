// 该文件是 Tracklet （影踪） 项目的一部分。
// src/model/yolov7.rs - 多检测头锚框模型解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{ConfigError, HeadConfig, ModelConfig},
  geometry::{AnchorGrid, BBox},
  model::{CandidateBox, Model, RawHeadOutput},
};

/// 每个锚框的头部字段数: x, y, w, h, objectness
const YOLO7_BOX_FIELDS: usize = 5;

#[derive(Error, Debug)]
pub enum Yolo7Error {
  #[error("模型配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("模型路径必须使用 {0} 方案")]
  ModelPathError(&'static str),
  #[error("类别数量为 0")]
  NoClasses,
  #[error("检测头数量不匹配: 配置 {expected}, 实际 {actual}")]
  HeadCountMismatch { expected: usize, actual: usize },
  #[error("检测头 {0} 的网格尺寸为 0")]
  EmptyGrid(usize),
  #[error("检测头 {head} 的张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch {
    head: usize,
    expected: usize,
    actual: usize,
  },
}

enum ModelSource {
  Path(String),
  Config(ModelConfig),
}

pub struct Yolo7Builder {
  source: ModelSource,
  num_classes: Option<usize>,
  head_shapes: Vec<(usize, usize)>,
}

impl FromUrlWithScheme for Yolo7Builder {
  const SCHEME: &'static str = "yolov7";
}

impl FromUrl for Yolo7Builder {
  type Error = Yolo7Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo7Error::ModelPathError(Self::SCHEME));
    }

    Ok(Self {
      source: ModelSource::Path(url.path().to_string()),
      num_classes: None,
      head_shapes: Vec::new(),
    })
  }
}

impl Yolo7Builder {
  pub fn new(config: ModelConfig) -> Self {
    Self {
      source: ModelSource::Config(config),
      num_classes: None,
      head_shapes: Vec::new(),
    }
  }

  /// 类别数量，通常取标签表长度
  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = Some(num_classes);
    self
  }

  /// 推理引擎声明的各检测头输出尺寸 (width, height)，顺序与配置一致
  pub fn head_shapes(mut self, shapes: &[(usize, usize)]) -> Self {
    self.head_shapes = shapes.to_vec();
    self
  }

  pub fn build(self) -> Result<Yolo7, Yolo7Error> {
    let config = match self.source {
      ModelSource::Path(path) => ModelConfig::from_path(&path)?,
      ModelSource::Config(config) => {
        config.validate()?;
        config
      }
    };

    let num_classes = match self.num_classes {
      Some(n) if n > 0 => n,
      _ => {
        error!("未设置类别数量");
        return Err(Yolo7Error::NoClasses);
      }
    };

    if self.head_shapes.len() != config.heads.len() {
      error!(
        "预期检测头数量为 {}, 实际为 {}",
        config.heads.len(),
        self.head_shapes.len()
      );
      return Err(Yolo7Error::HeadCountMismatch {
        expected: config.heads.len(),
        actual: self.head_shapes.len(),
      });
    }

    let num_anchors = config.num_anchors();
    let step = num_classes + YOLO7_BOX_FIELDS;
    let mut grids = Vec::with_capacity(self.head_shapes.len());
    let mut expected_lens = Vec::with_capacity(self.head_shapes.len());
    for (head, &(width, height)) in self.head_shapes.iter().enumerate() {
      if width == 0 || height == 0 {
        return Err(Yolo7Error::EmptyGrid(head));
      }
      debug!(
        "检测头 {}: 网格 {}x{}, 步长 {}, 锚框 {:?}",
        head, width, height, config.heads[head].stride, config.heads[head].anchors
      );
      grids.push(AnchorGrid::new(width, height));
      expected_lens.push(width * height * num_anchors * step);
    }

    info!(
      "模型加载完成: {} 个检测头, {} 个类别, 输入 {}x{}",
      grids.len(),
      num_classes,
      config.input_width,
      config.input_height
    );

    Ok(Yolo7 {
      config,
      num_classes,
      grids,
      expected_lens,
    })
  }
}

/// 多检测头锚框检测模型的解码器
#[derive(Debug, Clone)]
pub struct Yolo7 {
  config: ModelConfig,
  num_classes: usize,
  grids: Vec<AnchorGrid>,
  expected_lens: Vec<usize>,
}

impl Yolo7 {
  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn num_heads(&self) -> usize {
    self.grids.len()
  }

  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  fn decode_head(
    &self,
    grid: &AnchorGrid,
    head: &HeadConfig,
    data: &[f32],
    score_threshold: f32,
    items: &mut Vec<CandidateBox>,
  ) {
    let nx = grid.width();
    let ny = grid.height();
    let num_anchors = head.anchors.len();
    let step = self.num_classes + YOLO7_BOX_FIELDS;

    for dy in 0..ny {
      for dx in 0..nx {
        let (gx, gy) = grid.cell(dx, dy);
        for (da, anchor) in head.anchors.iter().enumerate() {
          let idx = dy * nx * num_anchors * step + dx * num_anchors * step + da * step;
          let cell = &data[idx..idx + step];

          let confidence = cell[4];
          if confidence <= score_threshold {
            continue;
          }

          // 每个锚框至多输出一个类别：超过阈值的最高分类别
          let mut best: Option<(usize, f32)> = None;
          for (class_index, &class_score) in cell[YOLO7_BOX_FIELDS..].iter().enumerate() {
            let score = class_score * confidence;
            if score > score_threshold && best.is_none_or(|(_, s)| score > s) {
              best = Some((class_index, score));
            }
          }
          let Some((class_index, score)) = best else {
            continue;
          };

          let x = (cell[0] * 2.0 - 0.5 + gx as f32) * head.stride;
          let y = (cell[1] * 2.0 - 0.5 + gy as f32) * head.stride;
          let w = cell[2] * cell[2] * anchor[0];
          let h = cell[3] * cell[3] * anchor[1];

          items.push(CandidateBox {
            bbox: BBox::new(
              x / self.config.input_width,
              y / self.config.input_height,
              w / self.config.input_width,
              h / self.config.input_height,
            ),
            class_index,
            score,
          });
        }
      }
    }
  }
}

impl Model for Yolo7 {
  type Output = Vec<CandidateBox>;
  type Error = Yolo7Error;

  fn postprocess(
    &self,
    outputs: &[RawHeadOutput],
    score_threshold: f32,
  ) -> Result<Self::Output, Self::Error> {
    if outputs.len() != self.grids.len() {
      error!(
        "预期检测头数量为 {}, 实际为 {}",
        self.grids.len(),
        outputs.len()
      );
      return Err(Yolo7Error::HeadCountMismatch {
        expected: self.grids.len(),
        actual: outputs.len(),
      });
    }

    // 所有检测头校验通过后才开始解码
    for (head, (output, grid)) in outputs.iter().zip(&self.grids).enumerate() {
      let expected = self.expected_lens[head];
      if output.width != grid.width()
        || output.height != grid.height()
        || output.data.len() != expected
      {
        error!(
          "检测头 {}: 输出 {}x{} 长度 {}, 期望 {}x{} 长度 {}",
          head,
          output.width,
          output.height,
          output.data.len(),
          grid.width(),
          grid.height(),
          expected
        );
        return Err(Yolo7Error::ShapeMismatch {
          head,
          expected,
          actual: output.data.len(),
        });
      }
    }

    let mut items = Vec::new();
    for ((output, grid), head) in outputs.iter().zip(&self.grids).zip(&self.config.heads) {
      self.decode_head(grid, head, &output.data, score_threshold, &mut items);
    }

    debug!("解码得到 {} 个候选框", items.len());
    Ok(items)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const STEP: usize = 2 + YOLO7_BOX_FIELDS;

  fn small_config() -> ModelConfig {
    ModelConfig {
      input_width: 64.0,
      input_height: 64.0,
      heads: vec![HeadConfig {
        stride: 8.0,
        anchors: vec![[16.0, 32.0]],
      }],
    }
  }

  fn small_model() -> Yolo7 {
    Yolo7Builder::new(small_config())
      .num_classes(2)
      .head_shapes(&[(2, 2)])
      .build()
      .unwrap()
  }

  #[test]
  fn test_decode_single_anchor() {
    let model = small_model();
    let mut data = vec![0.0; 2 * 2 * STEP];
    // 网格 (dx=1, dy=0)
    data[STEP..2 * STEP].copy_from_slice(&[0.5, 0.5, 1.0, 1.0, 0.9, 0.2, 0.8]);

    let items = model
      .postprocess(&[RawHeadOutput::new(2, 2, data)], 0.4)
      .unwrap();
    assert_eq!(items.len(), 1);
    let item = items[0];
    assert_eq!(item.class_index, 1);
    assert!((item.score - 0.72).abs() < 1e-6);
    assert!((item.bbox.cx - 0.1875).abs() < 1e-6);
    assert!((item.bbox.cy - 0.0625).abs() < 1e-6);
    assert!((item.bbox.w - 0.25).abs() < 1e-6);
    assert!((item.bbox.h - 0.5).abs() < 1e-6);
  }

  #[test]
  fn test_objectness_without_class_yields_nothing() {
    let model = small_model();
    let mut data = vec![0.0; 2 * 2 * STEP];
    // objectness 超过阈值, 但 0.9 * 0.3 < 0.4
    data[..STEP].copy_from_slice(&[0.5, 0.5, 1.0, 1.0, 0.9, 0.3, 0.3]);

    let items = model
      .postprocess(&[RawHeadOutput::new(2, 2, data)], 0.4)
      .unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn test_first_best_class_wins_on_tie() {
    let model = small_model();
    let mut data = vec![0.0; 2 * 2 * STEP];
    data[..STEP].copy_from_slice(&[0.5, 0.5, 1.0, 1.0, 1.0, 0.7, 0.7]);

    let items = model
      .postprocess(&[RawHeadOutput::new(2, 2, data)], 0.4)
      .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_index, 0);
  }

  #[test]
  fn test_all_below_threshold_13x13x3() {
    let config = ModelConfig {
      input_width: 416.0,
      input_height: 416.0,
      heads: vec![HeadConfig {
        stride: 32.0,
        anchors: vec![[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
      }],
    };
    let model = Yolo7Builder::new(config)
      .num_classes(4)
      .head_shapes(&[(13, 13)])
      .build()
      .unwrap();

    let step = 4 + YOLO7_BOX_FIELDS;
    let mut data = vec![0.9; 13 * 13 * 3 * step];
    for cell in data.chunks_mut(step) {
      cell[4] = 0.3;
    }

    let items = model
      .postprocess(&[RawHeadOutput::new(13, 13, data)], 0.4)
      .unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn test_shape_mismatch_is_rejected() {
    let model = small_model();
    let result = model.postprocess(&[RawHeadOutput::new(2, 2, vec![0.0; 5])], 0.4);
    assert!(matches!(
      result,
      Err(Yolo7Error::ShapeMismatch {
        head: 0,
        expected: 28,
        actual: 5
      })
    ));

    let result = model.postprocess(&[], 0.4);
    assert!(matches!(
      result,
      Err(Yolo7Error::HeadCountMismatch {
        expected: 1,
        actual: 0
      })
    ));
  }

  #[test]
  fn test_builder_validation() {
    assert!(matches!(
      Yolo7Builder::new(small_config())
        .head_shapes(&[(2, 2)])
        .build(),
      Err(Yolo7Error::NoClasses)
    ));
    assert!(matches!(
      Yolo7Builder::new(small_config())
        .num_classes(2)
        .head_shapes(&[(2, 2), (1, 1)])
        .build(),
      Err(Yolo7Error::HeadCountMismatch { .. })
    ));
    assert!(matches!(
      Yolo7Builder::new(small_config())
        .num_classes(2)
        .head_shapes(&[(0, 2)])
        .build(),
      Err(Yolo7Error::EmptyGrid(0))
    ));

    let url = Url::parse("onnx:///tmp/model.json").unwrap();
    assert!(matches!(
      Yolo7Builder::from_url(&url),
      Err(Yolo7Error::ModelPathError("yolov7"))
    ));
  }
}
