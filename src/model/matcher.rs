// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/matcher.rs - 参考库相似度匹配
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{LabeledSequence, LandmarkError, LandmarkSequence, ObservationFrame, RawSequence},
  model::{Confidence, ConfidenceGate, Prediction},
};

/// 距离到置信度的缩放系数: `confidence = max(0, 100 - distance * scale)`
pub const DEFAULT_SIMILARITY_SCALE: f32 = 1000.0;
/// 匹配结果必须严格高于该置信度 (百分比)
pub const DEFAULT_MATCH_THRESHOLD: f32 = 10.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
  #[error("参考库为空，没有可比较的手语样本")]
  NoReferenceData,
}

#[derive(Error, Debug)]
pub enum LibraryLoadError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("参考库格式错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("{path}: {source}")]
  Landmark {
    path: String,
    #[source]
    source: LandmarkError,
  },
}

/// 一个手语标签及其示例序列
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSign {
  label: String,
  exemplars: Vec<LandmarkSequence>,
}

impl ReferenceSign {
  pub fn new(label: impl Into<String>, exemplar: LandmarkSequence) -> Self {
    Self::with_exemplars(label, vec![exemplar])
  }

  pub fn with_exemplars(label: impl Into<String>, exemplars: Vec<LandmarkSequence>) -> Self {
    Self {
      label: label.into(),
      exemplars,
    }
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn exemplars(&self) -> &[LandmarkSequence] {
    &self.exemplars
  }
}

/// 参考库，加载后只读；匹配时按顺序扫描，不排序也不修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceLibrary {
  signs: Vec<ReferenceSign>,
}

impl ReferenceLibrary {
  pub fn new(signs: Vec<ReferenceSign>) -> Self {
    Self { signs }
  }

  /// 相同标签的记录合并为同一个手语的多个示例，保持首次出现的顺序
  pub fn from_labeled(records: impl IntoIterator<Item = LabeledSequence>) -> Self {
    let mut signs: Vec<ReferenceSign> = Vec::new();
    for record in records {
      if record.sequence.is_empty() {
        debug!("跳过没有帧的参考记录: {:?}", record.label);
        continue;
      }
      let label = record.label.unwrap_or_else(|| "unknown".to_string());
      match signs.iter_mut().find(|s| s.label == label) {
        Some(sign) => sign.exemplars.push(record.sequence),
        None => signs.push(ReferenceSign::new(label, record.sequence)),
      }
    }
    Self { signs }
  }

  pub fn from_json_str(json: &str) -> Result<Self, LibraryLoadError> {
    let records = parse_records(json, "<memory>")?;
    Ok(Self::from_labeled(records))
  }

  pub fn signs(&self) -> &[ReferenceSign] {
    &self.signs
  }

  pub fn len(&self) -> usize {
    self.signs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.signs.is_empty()
  }
}

impl FromIterator<ReferenceSign> for ReferenceLibrary {
  fn from_iter<T: IntoIterator<Item = ReferenceSign>>(iter: T) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

/// 文件内容可以是单条记录，也可以是记录数组
fn parse_records(json: &str, path: &str) -> Result<Vec<LabeledSequence>, LibraryLoadError> {
  let value: serde_json::Value = serde_json::from_str(json)?;
  let raws: Vec<RawSequence> = match value {
    serde_json::Value::Array(items) => items
      .into_iter()
      .map(serde_json::from_value)
      .collect::<Result<_, _>>()?,
    other => vec![serde_json::from_value(other)?],
  };

  raws
    .into_iter()
    .map(|raw| {
      LabeledSequence::try_from(raw).map_err(|source| LibraryLoadError::Landmark {
        path: path.to_string(),
        source,
      })
    })
    .collect()
}

pub struct ReferenceLibraryBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for ReferenceLibraryBuilder {
  const SCHEME: &'static str = "library";
}

impl FromUrl for ReferenceLibraryBuilder {
  type Error = LibraryLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LibraryLoadError::SchemeMismatch);
    }
    Ok(Self {
      path: PathBuf::from(url.path()),
    })
  }
}

impl ReferenceLibraryBuilder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  fn load_file(path: &Path) -> Result<Vec<LabeledSequence>, LibraryLoadError> {
    let data = std::fs::read_to_string(path)?;
    parse_records(&data, &path.display().to_string())
  }

  pub fn build(self) -> Result<ReferenceLibrary, LibraryLoadError> {
    info!("加载参考库: {}", self.path.display());
    let records = if self.path.is_dir() {
      let mut files: Vec<PathBuf> = std::fs::read_dir(&self.path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
      files.sort();

      let mut records = Vec::new();
      for file in files {
        records.extend(Self::load_file(&file)?);
      }
      records
    } else {
      Self::load_file(&self.path)?
    };

    let library = ReferenceLibrary::from_labeled(records);
    if library.is_empty() {
      warn!("参考库 {} 中没有可用的手语样本", self.path.display());
    }
    info!("参考库加载完成: {} 个手语", library.len());
    Ok(library)
  }
}

/// 帧对齐的相似度匹配器
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
  scale: f32,
  gate: ConfidenceGate,
}

impl Default for SimilarityMatcher {
  fn default() -> Self {
    Self::new(
      DEFAULT_SIMILARITY_SCALE,
      ConfidenceGate::above(Confidence::from_percent(DEFAULT_MATCH_THRESHOLD)),
    )
  }
}

/// 一帧内按槽位位置配对比较，返回 (差值总和, 比较的点数)
fn frame_discrepancy(a: &ObservationFrame, b: &ObservationFrame) -> (f64, usize) {
  let mut total = 0.0;
  let mut count = 0;
  for (hand_a, hand_b) in a.slots().iter().zip(b.slots()) {
    let (Some(hand_a), Some(hand_b)) = (hand_a, hand_b) else {
      continue;
    };
    for (p, q) in hand_a.points().iter().zip(hand_b.points()) {
      total += p
        .coords()
        .iter()
        .zip(q.coords())
        .map(|(u, v)| (*u as f64 - v as f64).abs())
        .sum::<f64>();
      count += 1;
    }
  }
  (total, count)
}

impl SimilarityMatcher {
  pub fn new(scale: f32, gate: ConfidenceGate) -> Self {
    Self { scale, gate }
  }

  /// 截断对齐后的平均逐点差异；没有任何可比较的帧时返回 `None`
  pub fn distance(&self, query: &LandmarkSequence, exemplar: &LandmarkSequence) -> Option<f64> {
    let per_frame: Vec<f64> = query
      .frames()
      .iter()
      .zip(exemplar.frames())
      .filter_map(|(a, b)| match frame_discrepancy(a, b) {
        (_, 0) => None,
        (total, count) => Some(total / count as f64),
      })
      .collect();

    if per_frame.is_empty() {
      return None;
    }
    Some(per_frame.iter().sum::<f64>() / per_frame.len() as f64)
  }

  pub fn similarity(&self, query: &LandmarkSequence, exemplar: &LandmarkSequence) -> Confidence {
    match self.distance(query, exemplar) {
      Some(distance) => {
        Confidence::from_percent((100.0 - distance * self.scale as f64).max(0.0) as f32)
      }
      None => Confidence::ZERO,
    }
  }

  /// 在参考库中寻找最相似的手语
  ///
  /// 置信度并列时取参考库中先出现的手语。
  pub fn match_sequence(
    &self,
    query: &LandmarkSequence,
    library: &ReferenceLibrary,
  ) -> Result<Prediction, MatchError> {
    if library.is_empty() {
      return Err(MatchError::NoReferenceData);
    }
    if query.is_empty() {
      return Ok(Prediction::none());
    }

    let mut best: Option<&str> = None;
    let mut best_confidence = Confidence::ZERO;
    for sign in library.signs() {
      let confidence = sign
        .exemplars()
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| self.similarity(query, e))
        .fold(Confidence::ZERO, |acc, c| if c > acc { c } else { acc });
      debug!("与 {} 的相似度: {}", sign.label(), confidence);

      if confidence > best_confidence {
        best_confidence = confidence;
        best = Some(sign.label());
      }
    }

    let candidate = match best {
      Some(label) => Prediction::new(label, best_confidence),
      None => Prediction::none(),
    };
    Ok(self.gate.apply(candidate))
  }
}
