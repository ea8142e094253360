// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/registry.rs - 按名称索引的模型集合
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::model::TrainedModel;

/// 未命名模型使用的名称
pub const UNNAMED_MODEL: &str = "default";

/// 已加载模型的元数据摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
  pub name: String,
  pub accuracy: Option<f32>,
  pub cv_score: Option<f32>,
  pub timestamp: Option<String>,
}

/// 按名称索引的模型集合，名称按字典序排列
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
  models: BTreeMap<String, Arc<TrainedModel>>,
}

impl ModelRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 只包含一个模型，名称取自元数据
  pub fn single(model: TrainedModel) -> Self {
    let name = model
      .metadata()
      .name
      .clone()
      .unwrap_or_else(|| UNNAMED_MODEL.to_string());
    let mut registry = Self::new();
    registry.insert(name, model);
    registry
  }

  /// 同名模型只保留先加入的一个，返回是否加入
  pub fn insert(&mut self, name: impl Into<String>, model: TrainedModel) -> bool {
    let name = name.into();
    if self.models.contains_key(&name) {
      warn!("模型名称重复，忽略: {}", name);
      return false;
    }
    self.models.insert(name, Arc::new(model));
    true
  }

  pub fn get(&self, name: &str) -> Option<&Arc<TrainedModel>> {
    self.models.get(name)
  }

  /// 没有指定名称时使用的模型: 名称排序后的第一个
  pub fn default_model(&self) -> Option<(&str, &Arc<TrainedModel>)> {
    self
      .models
      .iter()
      .next()
      .map(|(name, model)| (name.as_str(), model))
  }

  pub fn names(&self) -> Vec<String> {
    self.models.keys().cloned().collect()
  }

  pub fn summaries(&self) -> Vec<ModelSummary> {
    self
      .models
      .iter()
      .map(|(name, model)| {
        let meta = model.metadata();
        ModelSummary {
          name: name.clone(),
          accuracy: meta.accuracy,
          cv_score: meta.cv_score,
          timestamp: meta.timestamp.clone(),
        }
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.models.len()
  }

  pub fn is_empty(&self) -> bool {
    self.models.is_empty()
  }
}
