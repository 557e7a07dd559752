// 该文件是 Tracklet （影踪） 项目的一部分。
// src/tracking.rs - 时空分组与跟踪对象管理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod engine;
mod group;
mod pool;

pub use self::engine::{GroupingEngine, surface_rotation};
pub use self::group::{DetectionGroup, Observation};
pub use self::pool::{Tracklet, TrackletFactory, TrackletPool};
