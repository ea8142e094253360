// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  dispatch::PredictionResult,
  input::Sample,
  output::{OutputRecord, Render},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `folder:///path/to/dir[?always]`
///
/// 按日期分目录保存每个结果，默认只保存识别出手语的结果。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record_counter: AtomicU32::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn record_id(&self) -> u32 {
    // 文件名只保留低 16 位
    self
      .record_counter
      .fetch_add(1, Ordering::Relaxed)
      .wrapping_add(1)
      & 0xFFFF
  }

  fn record_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.record_id()
    )))
  }
}

impl Render<Sample, PredictionResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Sample, result: &PredictionResult) -> Result<(), Self::Error> {
    if !self.always && !result.is_match() {
      return Ok(());
    }
    let path = self.record_path()?;
    let data = serde_json::to_vec_pretty(&OutputRecord::new(frame, result))?;
    std::fs::write(&path, data)?;
    debug!("结果已保存: {}", path.display());
    Ok(())
  }
}
