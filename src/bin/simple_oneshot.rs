// 该文件是 Shouyu （手语） 项目的一部分。
// src/bin/simple_oneshot.rs - 单样本预测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shouyu::{
  FromUrl,
  dispatch::{Dispatcher, PredictionContext, PredictorConfig, SharedContext},
  input::InputWrapper,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shouyu 单样本预测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 分类模型
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
  /// 模型名称
  #[arg(long, value_name = "NAME")]
  pub model_name: Option<String>,
  /// 参考库
  #[arg(long, value_name = "LIBRARY")]
  pub library: Option<Url>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, default_value = "stdout://", value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let context = PredictionContext::load(args.model.as_ref(), args.library.as_ref());
  let dispatcher = Dispatcher::new(
    PredictorConfig {
      model_name: args.model_name,
      ..PredictorConfig::default()
    },
    Arc::new(SharedContext::new(context)),
  );
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, dispatcher, output)?;

  Ok(())
}
