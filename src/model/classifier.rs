// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/classifier.rs - 训练模型加载与分类
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  feature::{FeatureMode, FeatureVector},
  model::{
    Confidence, ConfidenceGate, LabelMap, LabelMapError, ModelRegistry, Prediction,
    decision::{DecisionError, DecisionFunction, StandardScaler},
  },
};

/// 分类器默认门限 (百分比)
pub const DEFAULT_CLASSIFIER_GATE: f32 = 50.0;
/// 模型不输出概率时使用的名义概率
pub const DEFAULT_NOMINAL_PROBABILITY: f32 = 0.8;

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型格式错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("标签映射无效: {0}")]
  Labels(#[from] LabelMapError),
  #[error("模型无效: {0}")]
  Decision(#[from] DecisionError),
}

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("特征模式不匹配: 模型需要 {expected:?}, 实际为 {found:?}")]
  ModeMismatch {
    expected: FeatureMode,
    found: FeatureMode,
  },
  #[error("推理失败: {0}")]
  Decision(#[from] DecisionError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub accuracy: Option<f32>,
  #[serde(default)]
  pub cv_score: Option<f32>,
  #[serde(default)]
  pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelDocument {
  labels: LabelMap,
  #[serde(default)]
  feature_mode: FeatureMode,
  #[serde(default)]
  scaler: Option<StandardScaler>,
  decision: DecisionFunction,
  #[serde(default)]
  metadata: ModelMetadata,
}

/// 训练好的模型: 决策函数、标签映射、可选标准化参数
///
/// 加载后只读，可以在多个预测调用之间共享。
#[derive(Debug, Clone)]
pub struct TrainedModel {
  labels: LabelMap,
  feature_mode: FeatureMode,
  scaler: Option<StandardScaler>,
  decision: DecisionFunction,
  metadata: ModelMetadata,
}

impl TrainedModel {
  pub fn new(
    labels: LabelMap,
    feature_mode: FeatureMode,
    scaler: Option<StandardScaler>,
    decision: DecisionFunction,
    metadata: ModelMetadata,
  ) -> Result<Self, ModelLoadError> {
    let input_dim = feature_mode.width();
    if let Some(scaler) = &scaler {
      scaler.validate(input_dim)?;
    }
    decision.validate(input_dim)?;

    let classes = decision.class_count();
    if labels.len() != classes {
      warn!(
        "标签数量 {} 与模型类别数 {} 不一致，无法解码的类别将使用合成标签",
        labels.len(),
        classes
      );
    }

    Ok(Self {
      labels,
      feature_mode,
      scaler,
      decision,
      metadata,
    })
  }

  pub fn from_json_str(json: &str) -> Result<Self, ModelLoadError> {
    let doc: ModelDocument = serde_json::from_str(json)?;
    Self::new(
      doc.labels,
      doc.feature_mode,
      doc.scaler,
      doc.decision,
      doc.metadata,
    )
  }

  pub fn labels(&self) -> &LabelMap {
    &self.labels
  }

  pub fn feature_mode(&self) -> FeatureMode {
    self.feature_mode
  }

  pub fn scaler(&self) -> Option<&StandardScaler> {
    self.scaler.as_ref()
  }

  pub fn decision(&self) -> &DecisionFunction {
    &self.decision
  }

  pub fn metadata(&self) -> &ModelMetadata {
    &self.metadata
  }
}

pub struct TrainedModelBuilder {
  model_path: PathBuf,
}

impl FromUrlWithScheme for TrainedModelBuilder {
  const SCHEME: &'static str = "model";
}

impl FromUrl for TrainedModelBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ModelLoadError::SchemeMismatch);
    }

    Ok(TrainedModelBuilder {
      model_path: PathBuf::from(url.path()),
    })
  }
}

impl TrainedModelBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
    }
  }

  pub fn build(self) -> Result<TrainedModel, ModelLoadError> {
    Self::load_file(&self.model_path)
  }

  /// 路径为目录时加载其中所有 `*.json` 模型，单个文件失败只记录错误
  ///
  /// 模型名称取自元数据，缺省时使用文件名。
  pub fn build_registry(self) -> Result<ModelRegistry, ModelLoadError> {
    if !self.model_path.is_dir() {
      return Self::load_file(&self.model_path).map(ModelRegistry::single);
    }

    info!("加载模型目录: {}", self.model_path.display());
    let mut files: Vec<PathBuf> = std::fs::read_dir(&self.model_path)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
      .collect();
    files.sort();

    let mut registry = ModelRegistry::new();
    for file in files {
      match Self::load_file(&file) {
        Ok(model) => {
          let name = match &model.metadata().name {
            Some(name) => name.clone(),
            None => file
              .file_stem()
              .map(|stem| stem.to_string_lossy().into_owned())
              .unwrap_or_default(),
          };
          registry.insert(name, model);
        }
        Err(err) => error!("模型 {} 加载失败，跳过: {}", file.display(), err),
      }
    }

    if registry.is_empty() {
      warn!("模型目录 {} 中没有可用的模型", self.model_path.display());
    }
    info!("模型目录加载完成: {:?}", registry.names());
    Ok(registry)
  }

  fn load_file(path: &Path) -> Result<TrainedModel, ModelLoadError> {
    info!("加载模型文件: {}", path.display());
    let data = std::fs::read_to_string(path)?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);

    let model = TrainedModel::from_json_str(&data)?;

    let meta = model.metadata();
    info!(
      "模型加载完成: {} ({} 个标签, 特征模式 {:?})",
      meta.name.as_deref().unwrap_or("unnamed"),
      model.labels().len(),
      model.feature_mode()
    );
    if let Some(accuracy) = meta.accuracy {
      info!("模型准确率: {:.3}", accuracy);
    }
    if let Some(cv_score) = meta.cv_score {
      debug!("交叉验证得分: {:.3}", cv_score);
    }
    if let Some(timestamp) = &meta.timestamp {
      debug!("训练时间: {}", timestamp);
    }

    Ok(model)
  }
}

/// 分类适配器: 标准化 → 决策函数 → 标签解码 → 置信度门限
#[derive(Debug, Clone, Copy)]
pub struct ClassifierAdapter {
  gate: ConfidenceGate,
  nominal_probability: f32,
}

impl Default for ClassifierAdapter {
  fn default() -> Self {
    Self::new(
      ConfidenceGate::at_least(Confidence::from_percent(DEFAULT_CLASSIFIER_GATE)),
      DEFAULT_NOMINAL_PROBABILITY,
    )
  }
}

impl ClassifierAdapter {
  pub fn new(gate: ConfidenceGate, nominal_probability: f32) -> Self {
    Self {
      gate,
      nominal_probability,
    }
  }

  pub fn gate(&self) -> ConfidenceGate {
    self.gate
  }

  pub fn predict(
    &self,
    features: &FeatureVector,
    model: &TrainedModel,
  ) -> Result<Prediction, ClassifierError> {
    let guess = self.predict_ungated(features, model)?;
    Ok(self.gate.apply(guess))
  }

  /// 不经过门限的原始预测
  pub fn predict_ungated(
    &self,
    features: &FeatureVector,
    model: &TrainedModel,
  ) -> Result<Prediction, ClassifierError> {
    if features.mode() != model.feature_mode() {
      return Err(ClassifierError::ModeMismatch {
        expected: model.feature_mode(),
        found: features.mode(),
      });
    }

    let outcome = match model.scaler() {
      Some(scaler) => {
        let scaled = scaler.transform(features.as_slice())?;
        model.decision().decide(&scaled)?
      }
      None => model.decision().decide(features.as_slice())?,
    };

    let confidence = match outcome.probability() {
      Some(p) => Confidence::from_probability(p),
      None => {
        debug!("模型不提供概率，使用名义置信度 {}", self.nominal_probability);
        Confidence::from_probability(self.nominal_probability)
      }
    };

    let label = match model.labels().decode(outcome.class_id) {
      Some(label) => label.to_string(),
      None => {
        warn!("类别 {} 无法解码为标签，使用合成标签", outcome.class_id);
        format!("sign_{}", outcome.class_id)
      }
    };

    debug!("分类结果: {} ({})", label, confidence);
    Ok(Prediction::new(label, confidence))
  }
}
