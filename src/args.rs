// 该文件是 Shouyu （手语） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::Parser;
use url::Url;

use shouyu::dispatch::PredictorConfig;
use shouyu::model::{
  DEFAULT_CLASSIFIER_GATE, DEFAULT_MATCH_THRESHOLD, DEFAULT_NOMINAL_PROBABILITY,
  DEFAULT_SIMILARITY_SCALE,
};

/// Shouyu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类模型，例如 model:///path/to/model.json 或 model:///path/to/dir
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 模型目录中使用的模型名称，未指定时使用名称排序后的第一个
  #[arg(long, value_name = "NAME")]
  pub model_name: Option<String>,

  /// 列出已加载的模型后退出
  #[arg(long)]
  pub list_models: bool,

  /// 参考库，例如 library:///path/to/library.json 或 library:///path/to/dir
  #[arg(long, value_name = "LIBRARY")]
  pub library: Option<Url>,

  /// 输入来源
  /// 支持格式:
  /// - file:///path/to/sequence.json
  /// - folder:///path/to/dir
  /// - stdin://
  #[arg(long, value_name = "SOURCE", required_unless_present = "list_models")]
  pub input: Option<Url>,

  /// 输出路径
  /// 支持格式:
  /// - stdout://
  /// - folder:///path/to/dir[?always]
  #[arg(long, default_value = "stdout://", value_name = "OUTPUT")]
  pub output: Url,

  /// 相似度匹配门限 (0 - 100，结果必须严格大于该值)
  #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD, value_name = "PERCENT")]
  pub match_threshold: f32,

  /// 分类器门限 (0 - 100，结果大于等于该值时保留)
  #[arg(long, default_value_t = DEFAULT_CLASSIFIER_GATE, value_name = "PERCENT")]
  pub classifier_gate: f32,

  /// 模型不提供概率时使用的名义概率 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NOMINAL_PROBABILITY, value_name = "PROBABILITY")]
  pub nominal_confidence: f32,

  /// 距离到置信度的缩放系数
  #[arg(long, default_value_t = DEFAULT_SIMILARITY_SCALE, value_name = "SCALE")]
  pub similarity_scale: f32,

  /// 没有模型和参考库结果时启用规则回退
  #[arg(long)]
  pub heuristic_fallback: bool,

  /// 最多处理的样本数
  #[arg(long, value_name = "COUNT")]
  pub sample_limit: Option<usize>,
}

impl Args {
  pub fn predictor_config(&self) -> PredictorConfig {
    PredictorConfig {
      match_threshold: self.match_threshold,
      classifier_gate: self.classifier_gate,
      nominal_confidence: self.nominal_confidence,
      similarity_scale: self.similarity_scale,
      heuristic_fallback: self.heuristic_fallback,
      model_name: self.model_name.clone(),
    }
  }
}
