// 该文件是 Shouyu （手语） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shouyu::{
  FromUrl,
  dispatch::{Dispatcher, PredictionContext, SharedContext},
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.predictor_config();

  info!("模型: {:?}", args.model.as_ref().map(|u| u.as_str()));
  info!("参考库: {:?}", args.library.as_ref().map(|u| u.as_str()));
  info!("输入来源: {:?}", args.input.as_ref().map(|u| u.as_str()));
  info!("输出路径: {}", args.output);
  info!("参数: {:?}", config);

  let context = PredictionContext::load(args.model.as_ref(), args.library.as_ref());
  let dispatcher = Dispatcher::new(config, Arc::new(SharedContext::new(context)));

  if args.list_models {
    let models = dispatcher.models();
    println!(
      "{}",
      serde_json::json!({"models": models, "total_models": models.len()})
    );
    return Ok(());
  }

  let source = args
    .input
    .as_ref()
    .ok_or_else(|| anyhow::anyhow!("缺少输入来源 --input"))?;
  let input = InputWrapper::from_url(source)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_sample_limit(args.sample_limit)
    .run_task(input, dispatcher, output)?;

  Ok(())
}
