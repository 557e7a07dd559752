// 该文件是 Tracklet （影踪） 项目的一部分。
// src/label.rs - 标签配置表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
  #[error("第 {0} 个标签名为空")]
  EmptyLabel(usize),
  #[error("标签重复: {0}")]
  Duplicate(String),
  #[error("标签路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
}

/// 单个类别的配置：标签名与附加评分（例如营养评级）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSetting {
  pub label: String,
  #[serde(alias = "nutri_score", alias = "nutriScore")]
  pub aux_score: i32,
}

/// 类别索引到标签配置的静态映射，加载一次后只读
#[derive(Debug, Clone)]
pub struct LabelTable {
  settings: Box<[LabelSetting]>,
}

impl LabelTable {
  pub fn new(settings: Vec<LabelSetting>) -> Result<Self, LabelError> {
    if settings.is_empty() {
      return Err(LabelError::Empty);
    }

    let mut seen = HashSet::with_capacity(settings.len());
    for (idx, setting) in settings.iter().enumerate() {
      if setting.label.is_empty() {
        return Err(LabelError::EmptyLabel(idx));
      }
      if !seen.insert(setting.label.as_str()) {
        return Err(LabelError::Duplicate(setting.label.clone()));
      }
    }

    debug!("标签表: {} 个类别", settings.len());
    Ok(Self {
      settings: settings.into_boxed_slice(),
    })
  }

  pub fn from_json(text: &str) -> Result<Self, LabelError> {
    let settings: Vec<LabelSetting> = serde_json::from_str(text)?;
    Self::new(settings)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json(&text)
  }

  /// 类别数量
  pub fn len(&self) -> usize {
    self.settings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.settings.is_empty()
  }

  /// 按类别索引查询
  pub fn get(&self, class_index: usize) -> Option<&LabelSetting> {
    self.settings.get(class_index)
  }

  pub fn iter(&self) -> impl Iterator<Item = &LabelSetting> {
    self.settings.iter()
  }
}

impl FromUrlWithScheme for LabelTable {
  const SCHEME: &'static str = "labels";
}

impl FromUrl for LabelTable {
  type Error = LabelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LabelError::SchemeMismatch(Self::SCHEME));
    }
    Self::from_path(url.path())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn setting(label: &str, aux_score: i32) -> LabelSetting {
    LabelSetting {
      label: label.to_string(),
      aux_score,
    }
  }

  #[test]
  fn test_lookup() {
    let table = LabelTable::new(vec![setting("apple", 0), setting("cola", 4)]).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1).map(|s| s.label.as_str()), Some("cola"));
    assert_eq!(table.get(0).map(|s| s.aux_score), Some(0));
    assert!(table.get(2).is_none());
  }

  #[test]
  fn test_from_json_accepts_original_field_name() {
    let table = LabelTable::from_json(
      r#"[{"label": "apple", "nutriScore": 1}, {"label": "chips", "aux_score": 3}]"#,
    )
    .unwrap();
    let scores: Vec<i32> = table.iter().map(|s| s.aux_score).collect();
    assert_eq!(scores, vec![1, 3]);
  }

  #[test]
  fn test_rejects_malformed_tables() {
    assert!(matches!(LabelTable::new(vec![]), Err(LabelError::Empty)));
    assert!(matches!(
      LabelTable::new(vec![setting("a", 0), setting("a", 1)]),
      Err(LabelError::Duplicate(_))
    ));
    assert!(matches!(
      LabelTable::new(vec![setting("", 0)]),
      Err(LabelError::EmptyLabel(0))
    ));
    assert!(matches!(
      LabelTable::from_json("{not json"),
      Err(LabelError::Json(_))
    ));
  }

  #[test]
  fn test_scheme_mismatch() {
    let url = Url::parse("file:///tmp/labels.json").unwrap();
    assert!(matches!(
      LabelTable::from_url(&url),
      Err(LabelError::SchemeMismatch("labels"))
    ));
  }
}
