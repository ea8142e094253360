// 该文件是 Shouyu （手语） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 置信度，统一以 0-100 的百分比保存
///
/// 决策函数内部使用 0-1 概率，只在 [`Confidence::from_probability`] 处换算一次。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Confidence(f32);

impl Confidence {
  pub const ZERO: Confidence = Confidence(0.0);
  pub const FULL: Confidence = Confidence(100.0);

  pub fn from_percent(percent: f32) -> Self {
    if percent.is_nan() {
      return Self::ZERO;
    }
    Confidence(percent.clamp(0.0, 100.0))
  }

  pub fn from_probability(probability: f32) -> Self {
    Self::from_percent(probability * 100.0)
  }

  pub fn percent(self) -> f32 {
    self.0
  }

  pub fn probability(self) -> f32 {
    self.0 / 100.0
  }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.2}%", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBound {
  /// 置信度 >= 阈值时通过
  Inclusive,
  /// 置信度 > 阈值时通过
  Exclusive,
}

/// 最低置信度门限，匹配器与分类器共用
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
  threshold: Confidence,
  bound: GateBound,
}

impl ConfidenceGate {
  pub fn at_least(threshold: Confidence) -> Self {
    Self {
      threshold,
      bound: GateBound::Inclusive,
    }
  }

  pub fn above(threshold: Confidence) -> Self {
    Self {
      threshold,
      bound: GateBound::Exclusive,
    }
  }

  pub fn threshold(&self) -> Confidence {
    self.threshold
  }

  pub fn admits(&self, confidence: Confidence) -> bool {
    match self.bound {
      GateBound::Inclusive => confidence >= self.threshold,
      GateBound::Exclusive => confidence > self.threshold,
    }
  }

  /// 低于门限的预测替换为空结果
  pub fn apply(&self, prediction: Prediction) -> Prediction {
    if prediction.label.is_some() && self.admits(prediction.confidence) {
      return prediction;
    }
    if let Some(label) = &prediction.label {
      debug!(
        "预测 {} 置信度 {} 未达到门限 {}，丢弃",
        label, prediction.confidence, self.threshold
      );
    }
    Prediction::none()
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prediction {
  pub label: Option<String>,
  pub confidence: Confidence,
}

impl Prediction {
  pub fn new(label: impl Into<String>, confidence: Confidence) -> Self {
    Self {
      label: Some(label.into()),
      confidence,
    }
  }

  /// 无匹配: `{label: None, confidence: 0}`
  pub fn none() -> Self {
    Self::default()
  }

  pub fn is_match(&self) -> bool {
    self.label.is_some()
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelMapError {
  #[error("标签重复: {0}")]
  Duplicate(String),
}

/// 标签 id 与字符串的双向映射，加载后不再变化
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct LabelMap {
  labels: Box<[String]>,
  index: HashMap<String, u32>,
}

impl LabelMap {
  pub fn new(labels: Vec<String>) -> Result<Self, LabelMapError> {
    let mut index = HashMap::with_capacity(labels.len());
    for (id, label) in labels.iter().enumerate() {
      if index.insert(label.clone(), id as u32).is_some() {
        return Err(LabelMapError::Duplicate(label.clone()));
      }
    }
    Ok(Self {
      labels: labels.into_boxed_slice(),
      index,
    })
  }

  pub fn decode(&self, id: u32) -> Option<&str> {
    self.labels.get(id as usize).map(String::as_str)
  }

  pub fn encode(&self, label: &str) -> Option<u32> {
    self.index.get(label).copied()
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl TryFrom<Vec<String>> for LabelMap {
  type Error = LabelMapError;

  fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
    Self::new(labels)
  }
}

mod classifier;
mod decision;
mod heuristic;
mod matcher;
mod registry;

pub use self::classifier::{
  ClassifierAdapter, ClassifierError, DEFAULT_CLASSIFIER_GATE, DEFAULT_NOMINAL_PROBABILITY,
  ModelLoadError, ModelMetadata, TrainedModel, TrainedModelBuilder,
};
pub use self::decision::{
  Activation, DecisionError, DecisionFunction, DecisionOutcome, DecisionTree, DenseLayer, Linear,
  Mlp, RandomForest, StandardScaler, TreeNode,
};
pub use self::heuristic::HeuristicFallback;
pub use self::matcher::{
  DEFAULT_MATCH_THRESHOLD, DEFAULT_SIMILARITY_SCALE, LibraryLoadError, MatchError,
  ReferenceLibrary, ReferenceLibraryBuilder, ReferenceSign, SimilarityMatcher,
};
pub use self::registry::{ModelRegistry, ModelSummary, UNNAMED_MODEL};
