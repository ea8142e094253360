// 该文件是 Shouyu （手语） 项目的一部分。
// src/dispatch.rs - 预测分发
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, feature,
  frame::{LandmarkError, LandmarkSequence},
  input::Sample,
  model::{
    ClassifierAdapter, ClassifierError, Confidence, ConfidenceGate, DEFAULT_CLASSIFIER_GATE,
    DEFAULT_MATCH_THRESHOLD, DEFAULT_NOMINAL_PROBABILITY, DEFAULT_SIMILARITY_SCALE,
    HeuristicFallback, MatchError, Model, ModelRegistry, ModelSummary, Prediction,
    ReferenceLibrary, ReferenceLibraryBuilder, SimilarityMatcher, TrainedModel,
    TrainedModelBuilder,
  },
};

/// 所有可调参数
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorConfig {
  /// 相似度匹配门限 (百分比，严格大于)
  pub match_threshold: f32,
  /// 分类器门限 (百分比，大于等于)
  pub classifier_gate: f32,
  /// 模型不提供概率时使用的名义概率
  pub nominal_confidence: f32,
  pub similarity_scale: f32,
  pub heuristic_fallback: bool,
  /// 使用的模型名称，未指定时使用名称排序后的第一个模型
  pub model_name: Option<String>,
}

impl Default for PredictorConfig {
  fn default() -> Self {
    Self {
      match_threshold: DEFAULT_MATCH_THRESHOLD,
      classifier_gate: DEFAULT_CLASSIFIER_GATE,
      nominal_confidence: DEFAULT_NOMINAL_PROBABILITY,
      similarity_scale: DEFAULT_SIMILARITY_SCALE,
      heuristic_fallback: false,
      model_name: None,
    }
  }
}

impl PredictorConfig {
  pub fn classifier(&self) -> ClassifierAdapter {
    ClassifierAdapter::new(
      ConfidenceGate::at_least(Confidence::from_percent(self.classifier_gate)),
      self.nominal_confidence,
    )
  }

  pub fn matcher(&self) -> SimilarityMatcher {
    SimilarityMatcher::new(
      self.similarity_scale,
      ConfidenceGate::above(Confidence::from_percent(self.match_threshold)),
    )
  }
}

/// 一次预测可见的模型与参考库，加载后只读
#[derive(Debug, Clone, Default)]
pub struct PredictionContext {
  pub models: Arc<ModelRegistry>,
  pub library: Option<Arc<ReferenceLibrary>>,
}

impl PredictionContext {
  pub fn new(model: Option<TrainedModel>, library: Option<ReferenceLibrary>) -> Self {
    Self::with_registry(model.map(ModelRegistry::single).unwrap_or_default(), library)
  }

  pub fn with_registry(models: ModelRegistry, library: Option<ReferenceLibrary>) -> Self {
    Self {
      models: Arc::new(models),
      library: library.map(Arc::new),
    }
  }

  /// 加载模型与参考库，任何一个失败只记录错误，继续以降级模式运行
  pub fn load(model: Option<&Url>, library: Option<&Url>) -> Self {
    let models = model.and_then(|url| {
      TrainedModelBuilder::from_url(url)
        .and_then(TrainedModelBuilder::build_registry)
        .inspect_err(|err| error!("模型 {} 加载失败: {}", url, err))
        .ok()
    });
    let library = library.and_then(|url| {
      ReferenceLibraryBuilder::from_url(url)
        .and_then(ReferenceLibraryBuilder::build)
        .inspect_err(|err| error!("参考库 {} 加载失败: {}", url, err))
        .ok()
    });

    let context = Self::with_registry(models.unwrap_or_default(), library);
    match (context.has_models(), &context.library) {
      (true, _) => info!("使用分类模型进行预测: {:?}", context.models.names()),
      (false, Some(_)) => warn!("没有可用的分类模型，仅使用参考库匹配"),
      (false, None) => warn!("没有可用的模型或参考库"),
    }
    context
  }

  pub fn has_models(&self) -> bool {
    !self.models.is_empty()
  }

  pub fn is_empty(&self) -> bool {
    !self.has_models() && self.library.is_none()
  }
}

/// 可整体替换的共享上下文
///
/// 正在进行的预测持有旧快照，替换不会影响它们。
#[derive(Debug, Default)]
pub struct SharedContext {
  current: RwLock<Arc<PredictionContext>>,
}

impl SharedContext {
  pub fn new(context: PredictionContext) -> Self {
    Self {
      current: RwLock::new(Arc::new(context)),
    }
  }

  pub fn snapshot(&self) -> Arc<PredictionContext> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn replace(&self, context: PredictionContext) {
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(context);
  }

  pub fn replace_model(&self, model: Option<TrainedModel>) {
    self.replace_models(model.map(ModelRegistry::single).unwrap_or_default());
  }

  pub fn replace_models(&self, models: ModelRegistry) {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let next = PredictionContext {
      models: Arc::new(models),
      library: current.library.clone(),
    };
    *current = Arc::new(next);
  }

  pub fn replace_library(&self, library: Option<ReferenceLibrary>) {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let next = PredictionContext {
      models: current.models.clone(),
      library: library.map(Arc::new),
    };
    *current = Arc::new(next);
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  Classifier,
  Matcher,
  Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Input,
  Unavailable,
  UnknownModel,
  Classifier,
  Matcher,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorKind::Input => "input",
      ErrorKind::Unavailable => "unavailable",
      ErrorKind::UnknownModel => "unknown_model",
      ErrorKind::Classifier => "classifier",
      ErrorKind::Matcher => "matcher",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug)]
pub enum PredictError {
  #[error("输入错误: {0}")]
  Input(#[from] LandmarkError),
  #[error("输入序列为空")]
  EmptyInput,
  #[error("没有可用的模型或参考库")]
  Unavailable,
  #[error("模型 {name} 不存在，可用模型: {available:?}")]
  UnknownModel { name: String, available: Vec<String> },
  #[error("分类器错误: {0}")]
  Classifier(#[from] ClassifierError),
  #[error("匹配错误: {0}")]
  Match(#[from] MatchError),
}

impl PredictError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PredictError::Input(_) | PredictError::EmptyInput => ErrorKind::Input,
      PredictError::Unavailable => ErrorKind::Unavailable,
      PredictError::UnknownModel { .. } => ErrorKind::UnknownModel,
      PredictError::Classifier(_) => ErrorKind::Classifier,
      PredictError::Match(_) => ErrorKind::Matcher,
    }
  }
}

/// 对外统一的结果: `{word, confidence, model?, raw_confidence?, error?}`，置信度为 0-100
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
  pub word: Option<String>,
  pub confidence: f32,
  /// 给出结果的分类模型名称
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  /// 分类结果被门限丢弃时的原始置信度
  #[serde(skip_serializing_if = "Option::is_none")]
  pub raw_confidence: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip)]
  pub error_kind: Option<ErrorKind>,
  #[serde(skip)]
  pub strategy: Option<Strategy>,
}

impl PredictionResult {
  pub fn from_prediction(prediction: Prediction, strategy: Strategy) -> Self {
    Self {
      word: prediction.label,
      confidence: prediction.confidence.percent(),
      model: None,
      raw_confidence: None,
      error: None,
      error_kind: None,
      strategy: Some(strategy),
    }
  }

  pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      word: None,
      confidence: 0.0,
      model: None,
      raw_confidence: None,
      error: Some(message.into()),
      error_kind: Some(kind),
      strategy: None,
    }
  }

  /// 分类器结果: 门限丢弃时保留原始置信度
  fn classified(raw: Prediction, gate: ConfidenceGate, model: &str) -> Self {
    let raw_confidence = raw.confidence.percent();
    let gated = gate.apply(raw);
    let rejected = !gated.is_match();
    Self {
      model: Some(model.to_string()),
      raw_confidence: rejected.then_some(raw_confidence),
      ..Self::from_prediction(gated, Strategy::Classifier)
    }
  }

  pub fn is_match(&self) -> bool {
    self.word.is_some()
  }
}

impl From<PredictError> for PredictionResult {
  fn from(err: PredictError) -> Self {
    PredictionResult::failed(err.kind(), err.to_string())
  }
}

/// 在分类器、相似度匹配与规则回退之间选择
///
/// 优先级: 模型 > 参考库 > 规则回退。只有在出错时才降级，
/// 低置信度的空结果直接返回。
pub struct Dispatcher {
  config: PredictorConfig,
  shared: Arc<SharedContext>,
  classifier: ClassifierAdapter,
  matcher: SimilarityMatcher,
  heuristic: HeuristicFallback,
}

impl Dispatcher {
  pub fn new(config: PredictorConfig, shared: Arc<SharedContext>) -> Self {
    Self {
      classifier: config.classifier(),
      matcher: config.matcher(),
      heuristic: HeuristicFallback::default(),
      config,
      shared,
    }
  }

  pub fn config(&self) -> &PredictorConfig {
    &self.config
  }

  pub fn shared(&self) -> &Arc<SharedContext> {
    &self.shared
  }

  /// 当前已加载模型的元数据
  pub fn models(&self) -> Vec<ModelSummary> {
    self.shared.snapshot().models.summaries()
  }

  pub fn try_predict(&self, sequence: &LandmarkSequence) -> Result<PredictionResult, PredictError> {
    self.try_predict_with(sequence, self.config.model_name.as_deref())
  }

  /// 指定模型名称进行预测，名称不存在时返回错误而不降级
  pub fn try_predict_with(
    &self,
    sequence: &LandmarkSequence,
    model_name: Option<&str>,
  ) -> Result<PredictionResult, PredictError> {
    if sequence.is_empty() {
      return Err(PredictError::EmptyInput);
    }

    let context = self.shared.snapshot();
    let mut last_error = None;

    let selected = match model_name {
      _ if !context.has_models() => None,
      Some(name) => match context.models.get(name) {
        Some(model) => Some((name, model)),
        None => {
          return Err(PredictError::UnknownModel {
            name: name.to_string(),
            available: context.models.names(),
          });
        }
      },
      None => context.models.default_model(),
    };

    if let Some((name, model)) = selected {
      match feature::extract(sequence, model.feature_mode()) {
        Some(features) => match self.classifier.predict_ungated(&features, model) {
          Ok(raw) => {
            return Ok(PredictionResult::classified(raw, self.classifier.gate(), name));
          }
          Err(err) => {
            warn!("分类器预测失败，尝试降级: {}", err);
            last_error = Some(PredictError::Classifier(err));
          }
        },
        // 只有逐帧展开模式会在有帧无手时得不到特征
        None => {
          debug!("序列中没有检测到手，无法提取 {:?} 特征", model.feature_mode());
          return Ok(PredictionResult {
            model: Some(name.to_string()),
            ..PredictionResult::from_prediction(Prediction::none(), Strategy::Classifier)
          });
        }
      }
    }

    if let Some(library) = &context.library {
      match self.matcher.match_sequence(sequence, library) {
        Ok(prediction) => {
          return Ok(PredictionResult::from_prediction(prediction, Strategy::Matcher));
        }
        Err(err) => {
          warn!("相似度匹配失败，尝试降级: {}", err);
          last_error = Some(PredictError::Match(err));
        }
      }
    }

    if self.config.heuristic_fallback {
      if let Some(prediction) = self.heuristic.predict(sequence) {
        info!("使用规则回退结果");
        return Ok(PredictionResult::from_prediction(prediction, Strategy::Heuristic));
      }
    }

    Err(last_error.unwrap_or(PredictError::Unavailable))
  }

  /// 任何失败都转换为带错误信息的空结果
  pub fn predict(&self, sequence: &LandmarkSequence) -> PredictionResult {
    self.predict_with(sequence, self.config.model_name.as_deref())
  }

  pub fn predict_with(
    &self,
    sequence: &LandmarkSequence,
    model_name: Option<&str>,
  ) -> PredictionResult {
    match self.try_predict_with(sequence, model_name) {
      Ok(result) => {
        debug!("预测结果: {:?} ({:.2})", result.word, result.confidence);
        result
      }
      Err(err) => {
        warn!("预测失败 [{}]: {}", err.kind(), err);
        err.into()
      }
    }
  }

  pub fn predict_json(&self, json: &str) -> PredictionResult {
    match LandmarkSequence::from_json_str(json) {
      Ok(sequence) => self.predict(&sequence),
      Err(err) => {
        warn!("无法解析输入序列: {}", err);
        PredictError::Input(err).into()
      }
    }
  }
}

impl Model for Dispatcher {
  type Input = Sample;
  type Output = PredictionResult;
  type Error = Infallible;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("处理样本 {}", input.id);
    Ok(match &input.sequence {
      Ok(sequence) => self.predict(sequence),
      Err(err) => {
        warn!("样本 {} 无效: {}", input.id, err);
        PredictionResult::failed(ErrorKind::Input, format!("输入错误: {err}"))
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feature::FeatureMode;
  use crate::frame::{HandFrame, LandmarkPoint, ObservationFrame};
  use crate::model::{
    DecisionFunction, DecisionTree, LabelMap, ModelMetadata, RandomForest, ReferenceSign,
    TreeNode, UNNAMED_MODEL,
  };

  fn constant(len: usize, x: f32) -> LandmarkSequence {
    (0..len)
      .map(|i| {
        ObservationFrame::with_hands(i, vec![HandFrame::uniform(LandmarkPoint::new(x, 0.5, 0.1))])
      })
      .collect()
  }

  fn forest_model(labels: &[&str], leaf: Vec<f32>) -> TrainedModel {
    let decision = DecisionFunction::RandomForest(RandomForest {
      trees: vec![DecisionTree {
        nodes: vec![TreeNode::Leaf { value: leaf }],
      }],
    });
    let labels = LabelMap::new(labels.iter().map(|l| l.to_string()).collect()).unwrap();
    TrainedModel::new(labels, FeatureMode::Stat30, None, decision, ModelMetadata::default())
      .unwrap()
  }

  fn library() -> ReferenceLibrary {
    ReferenceLibrary::new(vec![
      ReferenceSign::new("A", constant(10, 0.5)),
      ReferenceSign::new("B", constant(10, 0.55)),
    ])
  }

  fn dispatcher(model: Option<TrainedModel>, library: Option<ReferenceLibrary>) -> Dispatcher {
    let shared = Arc::new(SharedContext::new(PredictionContext::new(model, library)));
    Dispatcher::new(PredictorConfig::default(), shared)
  }

  #[test]
  fn empty_input_is_an_input_result() {
    let result = dispatcher(None, Some(library())).predict(&LandmarkSequence::default());
    assert_eq!(result.word, None);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.error_kind, Some(ErrorKind::Input));
    assert!(result.error.is_some());
  }

  #[test]
  fn nothing_loaded_is_unavailable() {
    let result = dispatcher(None, None).predict(&constant(3, 0.5));
    assert_eq!(result.error_kind, Some(ErrorKind::Unavailable));
    assert_eq!(result.word, None);
  }

  #[test]
  fn model_takes_priority_over_library() {
    let model = forest_model(&["model-word"], vec![1.0]);
    let result = dispatcher(Some(model), Some(library())).predict(&constant(5, 0.5));
    assert_eq!(result.word.as_deref(), Some("model-word"));
    assert_eq!(result.strategy, Some(Strategy::Classifier));
  }

  #[test]
  fn low_confidence_does_not_fall_through() {
    let model = forest_model(&["a", "b", "c"], vec![40.0, 30.0, 30.0]);
    let result = dispatcher(Some(model), Some(library())).predict(&constant(5, 0.5));
    assert_eq!(result.word, None);
    assert_eq!(result.error, None);
    assert_eq!(result.strategy, Some(Strategy::Classifier));
  }

  #[test]
  fn gated_result_keeps_raw_confidence() {
    let model = forest_model(&["a", "b", "c"], vec![40.0, 30.0, 30.0]);
    let result = dispatcher(Some(model), None).predict(&constant(5, 0.5));
    assert_eq!(result.word, None);
    assert_eq!(result.confidence, 0.0);
    assert!((result.raw_confidence.unwrap() - 40.0).abs() < 1e-3);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["model"], UNNAMED_MODEL);
    assert!((json["raw_confidence"].as_f64().unwrap() - 40.0).abs() < 1e-3);
  }

  #[test]
  fn admitted_result_has_no_raw_confidence() {
    let model = forest_model(&["a", "b"], vec![3.0, 1.0]);
    let result = dispatcher(Some(model), None).predict(&constant(5, 0.5));
    assert_eq!(result.word.as_deref(), Some("a"));
    assert_eq!(result.raw_confidence, None);
  }

  fn two_models() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.insert("random_forest", forest_model(&["forest-word"], vec![1.0]));
    registry.insert("neural_network", forest_model(&["network-word"], vec![1.0]));
    registry
  }

  #[test]
  fn model_is_selected_by_name() {
    let shared = Arc::new(SharedContext::new(PredictionContext::with_registry(
      two_models(),
      None,
    )));
    let dispatcher = Dispatcher::new(PredictorConfig::default(), shared.clone());
    let seq = constant(4, 0.5);

    let default = dispatcher.predict(&seq);
    assert_eq!(default.word.as_deref(), Some("network-word"));
    assert_eq!(default.model.as_deref(), Some("neural_network"));

    let chosen = dispatcher.predict_with(&seq, Some("random_forest"));
    assert_eq!(chosen.word.as_deref(), Some("forest-word"));
    assert_eq!(chosen.model.as_deref(), Some("random_forest"));

    let config = PredictorConfig {
      model_name: Some("random_forest".to_string()),
      ..PredictorConfig::default()
    };
    let configured = Dispatcher::new(config, shared);
    assert_eq!(configured.predict(&seq).word.as_deref(), Some("forest-word"));

    let names: Vec<String> = configured.models().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["neural_network", "random_forest"]);
  }

  #[test]
  fn unknown_model_name_is_reported() {
    let shared = Arc::new(SharedContext::new(PredictionContext::with_registry(
      two_models(),
      Some(library()),
    )));
    let dispatcher = Dispatcher::new(PredictorConfig::default(), shared);
    let seq = constant(10, 0.5);

    match dispatcher.try_predict_with(&seq, Some("svm")) {
      Err(PredictError::UnknownModel { name, available }) => {
        assert_eq!(name, "svm");
        assert_eq!(available, vec!["neural_network", "random_forest"]);
      }
      other => panic!("unexpected result: {other:?}"),
    }

    let result = dispatcher.predict_with(&seq, Some("svm"));
    assert_eq!(result.word, None);
    assert_eq!(result.error_kind, Some(ErrorKind::UnknownModel));
  }

  #[test]
  fn model_name_is_ignored_without_models() {
    let result = dispatcher(None, Some(library())).predict_with(&constant(10, 0.5), Some("svm"));
    assert_eq!(result.word.as_deref(), Some("A"));
  }

  #[test]
  fn library_only_uses_matcher() {
    let result = dispatcher(None, Some(library())).predict(&constant(10, 0.5));
    assert_eq!(result.word.as_deref(), Some("A"));
    assert_eq!(result.confidence, 100.0);
    assert_eq!(result.strategy, Some(Strategy::Matcher));
  }

  #[test]
  fn empty_library_reports_matcher_error() {
    let result = dispatcher(None, Some(ReferenceLibrary::default())).predict(&constant(3, 0.5));
    assert_eq!(result.error_kind, Some(ErrorKind::Matcher));
  }

  #[test]
  fn heuristic_only_when_enabled() {
    let shared = Arc::new(SharedContext::default());
    let config = PredictorConfig {
      heuristic_fallback: true,
      ..PredictorConfig::default()
    };
    let result = Dispatcher::new(config, shared).predict(&constant(3, 0.5));
    assert_eq!(result.word.as_deref(), Some("still"));
    assert_eq!(result.strategy, Some(Strategy::Heuristic));
  }

  #[test]
  fn repeated_predictions_are_identical() {
    let dispatcher = dispatcher(Some(forest_model(&["a", "b"], vec![3.0, 1.0])), None);
    let seq = constant(7, 0.3);
    let first = dispatcher.predict(&seq);
    for _ in 0..10 {
      assert_eq!(dispatcher.predict(&seq), first);
    }
  }

  #[test]
  fn swap_does_not_affect_held_snapshot() {
    let shared = Arc::new(SharedContext::new(PredictionContext::new(None, Some(library()))));
    let held = shared.snapshot();
    shared.replace_library(None);
    assert!(held.library.is_some());
    assert!(shared.snapshot().is_empty());

    shared.replace_model(Some(forest_model(&["x"], vec![1.0])));
    let dispatcher = Dispatcher::new(PredictorConfig::default(), shared);
    assert_eq!(dispatcher.predict(&constant(2, 0.5)).word.as_deref(), Some("x"));
  }

  #[test]
  fn load_failure_degrades_instead_of_failing() {
    let model = Url::parse("model:///no/such/model.json").unwrap();
    let wrong_scheme = Url::parse("file:///no/such/library.json").unwrap();
    let context = PredictionContext::load(Some(&model), Some(&wrong_scheme));
    assert!(context.is_empty());
  }

  #[test]
  fn malformed_json_is_an_input_error() {
    let result = dispatcher(None, Some(library())).predict_json("{not json");
    assert_eq!(result.error_kind, Some(ErrorKind::Input));
    assert_eq!(result.word, None);
  }

  #[test]
  fn result_serializes_without_empty_error() {
    let result = PredictionResult::from_prediction(
      Prediction::new("hello", Confidence::from_percent(87.5)),
      Strategy::Matcher,
    );
    let json = serde_json::to_string(&result).unwrap();
    assert_eq!(json, r#"{"word":"hello","confidence":87.5}"#);

    let failed = serde_json::to_value(PredictionResult::failed(ErrorKind::Unavailable, "x")).unwrap();
    assert_eq!(failed["word"], serde_json::Value::Null);
    assert_eq!(failed["error"], "x");
  }
}
