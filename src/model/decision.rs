// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/decision.rs - 决策函数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
  #[error("输入维度不匹配: 期望 {expected}, 实际 {found}")]
  DimensionMismatch { expected: usize, found: usize },
  #[error("模型结构无效: {0}")]
  Invalid(String),
}

impl DecisionError {
  fn invalid(msg: impl Into<String>) -> Self {
    DecisionError::Invalid(msg.into())
  }
}

/// 一次决策的结果，`probabilities` 为 0-1 概率
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
  pub class_id: u32,
  pub probabilities: Option<Box<[f32]>>,
}

impl DecisionOutcome {
  pub fn probability(&self) -> Option<f32> {
    self
      .probabilities
      .as_ref()
      .and_then(|p| p.get(self.class_id as usize).copied())
  }

  fn from_probabilities(probabilities: Vec<f32>) -> Self {
    Self {
      class_id: argmax(&probabilities) as u32,
      probabilities: Some(probabilities.into_boxed_slice()),
    }
  }
}

/// 训练好的决策函数，只负责推理
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionFunction {
  RandomForest(RandomForest),
  Mlp(Mlp),
  Linear(Linear),
}

impl DecisionFunction {
  pub fn class_count(&self) -> usize {
    match self {
      DecisionFunction::RandomForest(forest) => forest.class_count(),
      DecisionFunction::Mlp(mlp) => mlp.class_count(),
      DecisionFunction::Linear(linear) => linear.class_count(),
    }
  }

  pub fn has_probabilities(&self) -> bool {
    match self {
      DecisionFunction::Linear(linear) => linear.probability,
      _ => true,
    }
  }

  /// 加载时校验结构，保证之后的推理不会越界
  pub fn validate(&self, input_dim: usize) -> Result<(), DecisionError> {
    match self {
      DecisionFunction::RandomForest(forest) => forest.validate(input_dim),
      DecisionFunction::Mlp(mlp) => mlp.validate(input_dim),
      DecisionFunction::Linear(linear) => linear.validate(input_dim),
    }
  }

  pub fn decide(&self, input: &[f32]) -> Result<DecisionOutcome, DecisionError> {
    match self {
      DecisionFunction::RandomForest(forest) => forest.decide(input),
      DecisionFunction::Mlp(mlp) => mlp.decide(input),
      DecisionFunction::Linear(linear) => linear.decide(input),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
  /// `input[feature] <= threshold` 走左子树
  Split {
    feature: usize,
    threshold: f32,
    left: usize,
    right: usize,
  },
  /// 各类别的样本计数或权重
  Leaf { value: Vec<f32> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
  pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
  fn validate(&self, input_dim: usize, classes: usize) -> Result<(), DecisionError> {
    if self.nodes.is_empty() {
      return Err(DecisionError::invalid("决策树没有节点"));
    }
    for (idx, node) in self.nodes.iter().enumerate() {
      match node {
        TreeNode::Split {
          feature,
          left,
          right,
          ..
        } => {
          if *feature >= input_dim {
            return Err(DecisionError::invalid(format!(
              "节点 {} 使用的特征 {} 超出输入维度 {}",
              idx, feature, input_dim
            )));
          }
          // 子节点必须在父节点之后，保证遍历一定终止
          for child in [*left, *right] {
            if child <= idx || child >= self.nodes.len() {
              return Err(DecisionError::invalid(format!(
                "节点 {} 的子节点 {} 无效",
                idx, child
              )));
            }
          }
        }
        TreeNode::Leaf { value } => {
          if value.len() != classes {
            return Err(DecisionError::invalid(format!(
              "叶子节点 {} 的类别数 {} 与 {} 不一致",
              idx,
              value.len(),
              classes
            )));
          }
          if value.iter().any(|v| *v < 0.0) || value.iter().sum::<f32>() <= 0.0 {
            return Err(DecisionError::invalid(format!(
              "叶子节点 {} 的类别分布无效",
              idx
            )));
          }
        }
      }
    }
    Ok(())
  }

  fn leaf(&self, input: &[f32]) -> Result<&[f32], DecisionError> {
    let mut idx = 0;
    loop {
      let node = self
        .nodes
        .get(idx)
        .ok_or_else(|| DecisionError::invalid(format!("节点 {} 不存在", idx)))?;
      match node {
        TreeNode::Split {
          feature,
          threshold,
          left,
          right,
        } => {
          let value = input.get(*feature).ok_or(DecisionError::DimensionMismatch {
            expected: feature + 1,
            found: input.len(),
          })?;
          idx = if *value <= *threshold { *left } else { *right };
        }
        TreeNode::Leaf { value } => return Ok(value),
      }
    }
  }
}

/// 随机森林: 各棵树叶子类别分布归一化后取平均
#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
  pub trees: Vec<DecisionTree>,
}

impl RandomForest {
  fn class_count(&self) -> usize {
    self
      .trees
      .first()
      .and_then(|tree| {
        tree.nodes.iter().find_map(|node| match node {
          TreeNode::Leaf { value } => Some(value.len()),
          TreeNode::Split { .. } => None,
        })
      })
      .unwrap_or(0)
  }

  fn validate(&self, input_dim: usize) -> Result<(), DecisionError> {
    if self.trees.is_empty() {
      return Err(DecisionError::invalid("随机森林没有决策树"));
    }
    let classes = self.class_count();
    if classes == 0 {
      return Err(DecisionError::invalid("随机森林没有类别"));
    }
    self
      .trees
      .iter()
      .try_for_each(|tree| tree.validate(input_dim, classes))
  }

  fn decide(&self, input: &[f32]) -> Result<DecisionOutcome, DecisionError> {
    let mut probabilities = vec![0.0f32; self.class_count()];
    for tree in &self.trees {
      let leaf = tree.leaf(input)?;
      let total: f32 = leaf.iter().sum();
      for (p, v) in probabilities.iter_mut().zip(leaf) {
        *p += v / total;
      }
    }
    let n = self.trees.len() as f32;
    probabilities.iter_mut().for_each(|p| *p /= n);
    Ok(DecisionOutcome::from_probabilities(probabilities))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
  #[default]
  Relu,
  Tanh,
  Logistic,
  Identity,
}

impl Activation {
  fn apply(self, x: f32) -> f32 {
    match self {
      Activation::Relu => x.max(0.0),
      Activation::Tanh => x.tanh(),
      Activation::Logistic => sigmoid(x),
      Activation::Identity => x,
    }
  }
}

/// 全连接层，`weights` 每行对应一个输出单元
#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
  pub weights: Vec<Vec<f32>>,
  pub bias: Vec<f32>,
}

impl DenseLayer {
  fn input_dim(&self) -> usize {
    self.weights.first().map(Vec::len).unwrap_or(0)
  }

  fn output_dim(&self) -> usize {
    self.weights.len()
  }

  fn forward(&self, input: &[f32]) -> Vec<f32> {
    self
      .weights
      .iter()
      .zip(&self.bias)
      .map(|(row, b)| dot(row, input) + b)
      .collect()
  }
}

/// 多层感知机，隐藏层使用 `activation`，输出层为 softmax（单输出单元时为 logistic）
#[derive(Debug, Clone, Deserialize)]
pub struct Mlp {
  #[serde(default)]
  pub activation: Activation,
  pub layers: Vec<DenseLayer>,
}

impl Mlp {
  fn class_count(&self) -> usize {
    match self.layers.last().map(DenseLayer::output_dim) {
      Some(1) => 2,
      Some(n) => n,
      None => 0,
    }
  }

  fn validate(&self, input_dim: usize) -> Result<(), DecisionError> {
    if self.layers.is_empty() {
      return Err(DecisionError::invalid("MLP 没有网络层"));
    }
    let mut expected = input_dim;
    for (idx, layer) in self.layers.iter().enumerate() {
      if layer.output_dim() == 0 || layer.bias.len() != layer.output_dim() {
        return Err(DecisionError::invalid(format!(
          "第 {} 层的权重与偏置维度不一致",
          idx
        )));
      }
      if layer.weights.iter().any(|row| row.len() != expected) {
        return Err(DecisionError::invalid(format!(
          "第 {} 层的输入维度应为 {}",
          idx, expected
        )));
      }
      expected = layer.output_dim();
    }
    Ok(())
  }

  fn decide(&self, input: &[f32]) -> Result<DecisionOutcome, DecisionError> {
    let expected = self.layers.first().map(DenseLayer::input_dim).unwrap_or(0);
    check_dim(expected, input)?;

    let mut activations = input.to_vec();
    let last = self
      .layers
      .len()
      .checked_sub(1)
      .ok_or_else(|| DecisionError::invalid("MLP 没有网络层"))?;
    for (idx, layer) in self.layers.iter().enumerate() {
      activations = layer.forward(&activations);
      if idx < last {
        activations
          .iter_mut()
          .for_each(|a| *a = self.activation.apply(*a));
      }
    }

    let probabilities = match activations.as_slice() {
      [logit] => {
        let p = sigmoid(*logit);
        vec![1.0 - p, p]
      }
      logits => softmax(logits),
    };
    Ok(DecisionOutcome::from_probabilities(probabilities))
  }
}

/// 线性决策函数（逻辑回归、线性 SVM 等）
///
/// 只有一行系数时为二分类，决策值大于 0 判为类别 1。
/// `probability` 为 false 时不输出概率。
#[derive(Debug, Clone, Deserialize)]
pub struct Linear {
  pub coef: Vec<Vec<f32>>,
  pub intercept: Vec<f32>,
  #[serde(default)]
  pub probability: bool,
}

impl Linear {
  fn class_count(&self) -> usize {
    match self.coef.len() {
      1 => 2,
      n => n,
    }
  }

  fn validate(&self, input_dim: usize) -> Result<(), DecisionError> {
    if self.coef.is_empty() || self.coef.len() != self.intercept.len() {
      return Err(DecisionError::invalid("线性模型的系数与截距维度不一致"));
    }
    if self.coef.iter().any(|row| row.len() != input_dim) {
      return Err(DecisionError::invalid(format!(
        "线性模型的系数维度应为 {}",
        input_dim
      )));
    }
    Ok(())
  }

  fn decide(&self, input: &[f32]) -> Result<DecisionOutcome, DecisionError> {
    let expected = self.coef.first().map(Vec::len).unwrap_or(0);
    check_dim(expected, input)?;

    let scores: Vec<f32> = self
      .coef
      .iter()
      .zip(&self.intercept)
      .map(|(row, b)| dot(row, input) + b)
      .collect();

    if let [score] = scores.as_slice() {
      let class_id = u32::from(*score > 0.0);
      let probabilities = self.probability.then(|| {
        let p = sigmoid(*score);
        vec![1.0 - p, p].into_boxed_slice()
      });
      return Ok(DecisionOutcome {
        class_id,
        probabilities,
      });
    }

    if self.probability {
      Ok(DecisionOutcome::from_probabilities(softmax(&scores)))
    } else {
      Ok(DecisionOutcome {
        class_id: argmax(&scores) as u32,
        probabilities: None,
      })
    }
  }
}

/// 训练时拟合的标准化: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
  mean: Vec<f32>,
  scale: Vec<f32>,
}

impl StandardScaler {
  pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Self {
    Self { mean, scale }
  }

  pub fn dim(&self) -> usize {
    self.mean.len()
  }

  pub fn validate(&self, input_dim: usize) -> Result<(), DecisionError> {
    if self.mean.len() != input_dim || self.scale.len() != input_dim {
      return Err(DecisionError::invalid(format!(
        "标准化参数维度 ({}, {}) 与输入维度 {} 不一致",
        self.mean.len(),
        self.scale.len(),
        input_dim
      )));
    }
    Ok(())
  }

  pub fn transform(&self, input: &[f32]) -> Result<Vec<f32>, DecisionError> {
    check_dim(self.dim(), input)?;
    Ok(
      input
        .iter()
        .zip(self.mean.iter().zip(&self.scale))
        // 方差为 0 的维度不缩放
        .map(|(x, (m, s))| if *s == 0.0 { x - m } else { (x - m) / s })
        .collect(),
    )
  }
}

fn check_dim(expected: usize, input: &[f32]) -> Result<(), DecisionError> {
  if input.len() != expected {
    return Err(DecisionError::DimensionMismatch {
      expected,
      found: input.len(),
    });
  }
  Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
  let total: f32 = exps.iter().sum();
  exps.into_iter().map(|e| e / total).collect()
}

/// 并列时取第一个最大值
fn argmax(values: &[f32]) -> usize {
  let mut best = 0;
  for (idx, value) in values.iter().enumerate() {
    if *value > values[best] {
      best = idx;
    }
  }
  best
}
