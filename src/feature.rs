// 该文件是 Shouyu （手语） 项目的一部分。
// src/feature.rs - 关键点序列特征提取
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::frame::{AXES, LANDMARK_COUNT, LandmarkSequence, MAX_HANDS, ObservationFrame};

/// 特征提取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
  /// 每个槽位每个轴: 均值、总体标准差、最小值、最大值、中位数，共 30 维
  #[default]
  Stat30,
  /// 不含中位数的轻量统计，共 24 维
  Stat24Light,
  /// 单帧关键点展开，2 × 21 × 3 = 126 维
  RawFlatten126,
}

impl FeatureMode {
  pub const fn width(self) -> usize {
    match self {
      FeatureMode::Stat30 => MAX_HANDS * AXES * STAT30.len(),
      FeatureMode::Stat24Light => MAX_HANDS * AXES * STAT24_LIGHT.len(),
      FeatureMode::RawFlatten126 => MAX_HANDS * LANDMARK_COUNT * AXES,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statistic {
  Mean,
  StdDev,
  Min,
  Max,
  Median,
}

const STAT30: [Statistic; 5] = [
  Statistic::Mean,
  Statistic::StdDev,
  Statistic::Min,
  Statistic::Max,
  Statistic::Median,
];

const STAT24_LIGHT: [Statistic; 4] = [
  Statistic::Mean,
  Statistic::StdDev,
  Statistic::Min,
  Statistic::Max,
];

/// 定长特征向量，长度始终等于 `mode.width()`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
  mode: FeatureMode,
  values: Box<[f32]>,
}

impl FeatureVector {
  /// 按模式长度截断或补零
  pub fn fitted(mode: FeatureMode, mut values: Vec<f32>) -> Self {
    if values.len() != mode.width() {
      debug!(
        "特征长度 {} 与模式 {:?} 的长度 {} 不一致，进行截断/补零",
        values.len(),
        mode,
        mode.width()
      );
      values.resize(mode.width(), 0.0);
    }
    Self {
      mode,
      values: values.into_boxed_slice(),
    }
  }

  pub fn mode(&self) -> FeatureMode {
    self.mode
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl AsRef<[f32]> for FeatureVector {
  fn as_ref(&self) -> &[f32] {
    &self.values
  }
}

struct AxisSummary {
  mean: f64,
  std_dev: f64,
  min: f64,
  max: f64,
  median: f64,
}

impl AxisSummary {
  /// `values` 不能为空，调用后顺序会被打乱
  fn from_values(values: &mut [f64]) -> Self {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let min = values[0];
    let max = values[n - 1];

    // 常量轴直接给出精确结果，避免累加误差产生非零标准差
    if min == max {
      return Self {
        mean: min,
        std_dev: 0.0,
        min,
        max,
        median: min,
      };
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
      values[n / 2]
    } else {
      (values[n / 2 - 1] + values[n / 2]) / 2.0
    };

    Self {
      mean,
      std_dev: variance.sqrt(),
      min,
      max,
      median,
    }
  }

  fn get(&self, stat: Statistic) -> f64 {
    match stat {
      Statistic::Mean => self.mean,
      Statistic::StdDev => self.std_dev,
      Statistic::Min => self.min,
      Statistic::Max => self.max,
      Statistic::Median => self.median,
    }
  }
}

fn summarize(sequence: &LandmarkSequence, mode: FeatureMode, stats: &[Statistic]) -> FeatureVector {
  let mut features = Vec::with_capacity(mode.width());

  // 槽位顺序即每帧中手的出现顺序，不按左右手重排
  for slot in 0..MAX_HANDS {
    let mut axes: [Vec<f64>; AXES] = Default::default();
    for hand in sequence.frames().iter().filter_map(|f| f.hand(slot)) {
      for point in hand.points() {
        for (axis, value) in axes.iter_mut().zip(point.coords()) {
          axis.push(value as f64);
        }
      }
    }

    if axes[0].is_empty() {
      features.extend(std::iter::repeat_n(0.0, AXES * stats.len()));
      continue;
    }

    for axis in axes.iter_mut() {
      let summary = AxisSummary::from_values(axis);
      features.extend(stats.iter().map(|&stat| summary.get(stat) as f32));
    }
  }

  FeatureVector::fitted(mode, features)
}

/// 单帧展开为 126 维，缺失槽位补零
pub fn flatten_frame(frame: &ObservationFrame) -> FeatureVector {
  let mode = FeatureMode::RawFlatten126;
  let mut values = Vec::with_capacity(mode.width());
  for slot in 0..MAX_HANDS {
    match frame.hand(slot) {
      Some(hand) => values.extend(hand.points().iter().flat_map(|p| p.coords())),
      None => values.extend(std::iter::repeat_n(0.0, LANDMARK_COUNT * AXES)),
    }
  }
  FeatureVector::fitted(mode, values)
}

pub fn flatten_frames(sequence: &LandmarkSequence) -> Vec<FeatureVector> {
  sequence.frames().iter().map(flatten_frame).collect()
}

/// 将关键点序列归约为定长特征向量
///
/// 空序列返回 `None`，调用方应视为“无法预测”而不是全零观测。
/// `RawFlatten126` 模式取最后一个检测到手的帧；整段序列都没有手时同样返回 `None`。
pub fn extract(sequence: &LandmarkSequence, mode: FeatureMode) -> Option<FeatureVector> {
  if sequence.is_empty() {
    return None;
  }

  let features = match mode {
    FeatureMode::Stat30 => summarize(sequence, mode, &STAT30),
    FeatureMode::Stat24Light => summarize(sequence, mode, &STAT24_LIGHT),
    FeatureMode::RawFlatten126 => {
      let frame = sequence.frames().iter().rev().find(|f| f.has_hands())?;
      flatten_frame(frame)
    }
  };

  debug!("提取 {:?} 特征完成，共 {} 帧", mode, sequence.len());
  Some(features)
}
