// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/heuristic.rs - 基于运动幅度的规则回退
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::{
  feature::{self, FeatureMode},
  frame::LandmarkSequence,
  model::{Confidence, Prediction},
};

// Stat24Light 布局中第一个槽位: x 轴 [均值, 标准差, 最小, 最大], y 轴紧随其后
const X_MIN: usize = 2;
const X_MAX: usize = 3;
const Y_MIN: usize = 6;
const Y_MAX: usize = 7;

/// 没有模型和参考库时的低优先级猜测，只看第一只手的 x/y 运动范围
#[derive(Debug, Clone, Copy)]
pub struct HeuristicFallback {
  large_movement: f32,
  small_movement: f32,
}

impl Default for HeuristicFallback {
  fn default() -> Self {
    Self {
      large_movement: 0.3,
      small_movement: 0.1,
    }
  }
}

impl HeuristicFallback {
  pub fn predict(&self, sequence: &LandmarkSequence) -> Option<Prediction> {
    let features = feature::extract(sequence, FeatureMode::Stat24Light)?;
    let values = features.as_slice();
    let x_range = values[X_MAX] - values[X_MIN];
    let y_range = values[Y_MAX] - values[Y_MIN];
    debug!("规则回退: x 范围 {:.4}, y 范围 {:.4}", x_range, y_range);

    let (word, probability) = if x_range > self.large_movement {
      ("wave", 0.75)
    } else if y_range > self.large_movement {
      ("up_down", 0.70)
    } else if x_range < self.small_movement && y_range < self.small_movement {
      ("still", 0.65)
    } else {
      ("gesture", 0.60)
    };
    Some(Prediction::new(word, Confidence::from_probability(probability)))
  }
}
