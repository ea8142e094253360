// 该文件是 Shouyu （手语） 项目的一部分。
// src/task.rs - 预测任务
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

use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let sample = input.next().ok_or_else(|| anyhow::anyhow!("没有输入样本"))?;
    info!("输入样本获取成功，开始预测...");
    let now = std::time::Instant::now();
    let result = model.infer(&sample)?;
    let elapsed = now.elapsed();
    info!("预测完成，耗时: {:.2?}", elapsed);
    output.render_result(&sample, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  sample_limit: Option<usize>,
}

impl ContinuousTask {
  pub fn with_sample_limit(mut self, sample_limit: Option<usize>) -> Self {
    self.sample_limit = sample_limit;
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    // 一个进程只能注册一次，重复注册时继续运行但无法响应中断
    if let Err(err) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法注册中断处理: {}", err);
    }

    let mut sample_index = 0usize;
    let mut now = std::time::Instant::now();
    for sample in input {
      sample_index = sample_index.saturating_add(1);
      info!("处理第 {} 个样本", sample_index);
      let result = model.infer(&sample)?;
      let elapsed_a = now.elapsed();
      output.render_result(&sample, &result)?;
      let elapsed_b = now.elapsed();
      now = std::time::Instant::now();
      info!("预测完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.sample_limit.is_some_and(|n| sample_index >= n) {
        info!("达到指定样本数 {}, 退出任务循环", sample_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 个样本", sample_index);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::convert::Infallible;

  struct Doubler;

  impl Model for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Infallible;

    fn infer(&self, input: &u32) -> Result<u32, Infallible> {
      Ok(input * 2)
    }
  }

  #[derive(Default)]
  struct Collect(RefCell<Vec<(u32, u32)>>);

  impl Render<u32, u32> for &Collect {
    type Error = Infallible;

    fn render_result(&self, frame: &u32, result: &u32) -> Result<(), Infallible> {
      self.0.borrow_mut().push((*frame, *result));
      Ok(())
    }
  }

  #[test]
  fn one_shot_takes_first_sample() {
    let sink = Collect::default();
    OneShotTask.run_task(vec![3, 4].into_iter(), Doubler, &sink).unwrap();
    assert_eq!(*sink.0.borrow(), vec![(3, 6)]);
  }

  #[test]
  fn one_shot_without_input_fails() {
    let sink = Collect::default();
    assert!(OneShotTask.run_task(Vec::<u32>::new().into_iter(), Doubler, &sink).is_err());
  }

  #[test]
  fn continuous_stops_at_limit() {
    let sink = Collect::default();
    ContinuousTask::default()
      .with_sample_limit(Some(2))
      .run_task(1..10u32, Doubler, &sink)
      .unwrap();
    assert_eq!(*sink.0.borrow(), vec![(1, 2), (2, 4)]);
  }

  #[test]
  fn continuous_drains_input() {
    let sink = Collect::default();
    ContinuousTask::default().run_task(1..4u32, Doubler, &sink).unwrap();
    assert_eq!(sink.0.borrow().len(), 3);
  }
}
