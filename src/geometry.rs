// 该文件是 Tracklet （影踪） 项目的一部分。
// src/geometry.rs - 几何工具：边界框、锚点网格与增量均值
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 归一化坐标下的中心格式边界框
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
  /// 中心 x
  pub cx: f32,
  /// 中心 y
  pub cy: f32,
  /// 宽度
  pub w: f32,
  /// 高度
  pub h: f32,
}

impl BBox {
  pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }

  /// 转换为角点格式 [x_min, y_min, x_max, y_max]
  pub fn corners(&self) -> [f32; 4] {
    let half_w = self.w * 0.5;
    let half_h = self.h * 0.5;
    [
      self.cx - half_w,
      self.cy - half_h,
      self.cx + half_w,
      self.cy + half_h,
    ]
  }

  pub fn area(&self) -> f32 {
    self.w.max(0.0) * self.h.max(0.0)
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &BBox) -> f32 {
    let [ax1, ay1, ax2, ay2] = self.corners();
    let [bx1, by1, bx2, by2] = other.corners();

    let x1 = ax1.max(bx1);
    let y1 = ay1.max(by1);
    let x2 = ax2.min(bx2);
    let y2 = ay2.min(by2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 单个检测头的锚点网格
///
/// 按行优先顺序存放 `(x, y)` 单元坐标，加载模型时构建一次，之后只读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorGrid {
  width: usize,
  height: usize,
  cells: Box<[(u32, u32)]>,
}

impl AnchorGrid {
  pub fn new(width: usize, height: usize) -> Self {
    let mut cells = Vec::with_capacity(width * height);
    for dy in 0..height {
      for dx in 0..width {
        cells.push((dx as u32, dy as u32));
      }
    }

    Self {
      width,
      height,
      cells: cells.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  /// 取网格单元坐标，`dx < width` 且 `dy < height`
  pub fn cell(&self, dx: usize, dy: usize) -> (u32, u32) {
    self.cells[dy * self.width + dx]
  }
}

/// 可参与增量均值计算的数值类型（标量或向量）
pub trait MeanValue:
  Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> + Div<f32, Output = Self>
{
}

impl<T> MeanValue for T where
  T: Copy
    + Add<Output = T>
    + Sub<Output = T>
    + Mul<f32, Output = T>
    + Div<f32, Output = T>
{
}

/// 向 `count` 个样本的均值中加入一个新样本
pub fn avg_add<T: MeanValue>(avg: T, count: usize, value: T) -> T {
  let n = count as f32;
  (avg * n + value) / (n + 1.0)
}

/// 从 `count` 个样本的均值中移除一个样本，要求 `count > 1`
pub fn avg_remove<T: MeanValue>(avg: T, count: usize, value: T) -> T {
  let n = count as f32;
  (avg * n - value) / (n - 1.0)
}

/// O(1) 更新的滑动均值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningMean<T> {
  mean: T,
  count: usize,
}

impl<T: MeanValue> RunningMean<T> {
  /// 以第一个样本初始化
  pub fn new(first: T) -> Self {
    Self {
      mean: first,
      count: 1,
    }
  }

  pub fn push(&mut self, value: T) {
    if self.count == 0 {
      self.mean = value;
    } else {
      self.mean = avg_add(self.mean, self.count, value);
    }
    self.count += 1;
  }

  /// 移除一个此前加入过的样本；移除最后一个样本后均值无意义，仅计数归零
  pub fn pop(&mut self, value: T) {
    match self.count {
      0 => {}
      1 => self.count = 0,
      n => {
        self.mean = avg_remove(self.mean, n, value);
        self.count = n - 1;
      }
    }
  }

  pub fn mean(&self) -> T {
    self.mean
  }

  pub fn count(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use nalgebra::Vector3;

  #[test]
  fn test_corners_and_area() {
    let b = BBox::new(0.5, 0.5, 0.2, 0.4);
    let [x1, y1, x2, y2] = b.corners();
    assert!((x1 - 0.4).abs() < 1e-6);
    assert!((y1 - 0.3).abs() < 1e-6);
    assert!((x2 - 0.6).abs() < 1e-6);
    assert!((y2 - 0.7).abs() < 1e-6);
    assert!((b.area() - 0.08).abs() < 1e-6);
  }

  #[test]
  fn test_iou() {
    let a = BBox::new(0.5, 0.5, 0.2, 0.2);
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);

    let far = BBox::new(0.1, 0.1, 0.1, 0.1);
    assert_eq!(a.iou(&far), 0.0);

    // 右移半个宽度: 交集 0.1*0.2, 并集 0.04+0.04-0.02
    let half = BBox::new(0.6, 0.5, 0.2, 0.2);
    assert!((a.iou(&half) - 1.0 / 3.0).abs() < 1e-5);

    let degenerate = BBox::new(0.5, 0.5, 0.0, 0.0);
    assert_eq!(degenerate.iou(&degenerate), 0.0);
  }

  #[test]
  fn test_anchor_grid_layout() {
    let grid = AnchorGrid::new(4, 3);
    assert_eq!(grid.len(), 12);
    assert_eq!(grid.cell(0, 0), (0, 0));
    assert_eq!(grid.cell(3, 0), (3, 0));
    assert_eq!(grid.cell(1, 2), (1, 2));
  }

  #[test]
  fn test_running_mean_add_remove() {
    let mut mean = RunningMean::new(2.0f32);
    mean.push(4.0);
    mean.push(6.0);
    assert!((mean.mean() - 4.0).abs() < 1e-6);

    mean.pop(2.0);
    assert_eq!(mean.count(), 2);
    assert!((mean.mean() - 5.0).abs() < 1e-6);

    mean.pop(4.0);
    assert!((mean.mean() - 6.0).abs() < 1e-6);

    mean.pop(6.0);
    assert!(mean.is_empty());

    mean.push(1.5);
    assert_eq!(mean.count(), 1);
    assert!((mean.mean() - 1.5).abs() < 1e-6);
  }

  #[test]
  fn test_running_mean_vector() {
    let mut mean = RunningMean::new(Vector3::new(0.0f32, 0.0, 0.0));
    mean.push(Vector3::new(2.0, 4.0, 6.0));
    assert!((mean.mean() - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-6);
  }
}
