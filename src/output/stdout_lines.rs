// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/stdout_lines.rs - 标准输出 JSON 行
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  dispatch::PredictionResult,
  input::Sample,
  output::{OutputRecord, Render},
};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `stdout://`，每个样本一行 JSON
pub struct StdoutOutput;

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StdoutOutputError::SchemeMismatch);
    }
    Ok(StdoutOutput)
  }
}

impl StdoutOutput {
  pub fn write_line(
    writer: &mut impl Write,
    sample: &Sample,
    result: &PredictionResult,
  ) -> Result<(), StdoutOutputError> {
    serde_json::to_writer(&mut *writer, &OutputRecord::new(sample, result))?;
    writeln!(writer)?;
    Ok(())
  }
}

impl Render<Sample, PredictionResult> for StdoutOutput {
  type Error = StdoutOutputError;

  fn render_result(&self, frame: &Sample, result: &PredictionResult) -> Result<(), Self::Error> {
    let mut stdout = std::io::stdout().lock();
    Self::write_line(&mut stdout, frame, result)?;
    stdout.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dispatch::ErrorKind;
  use crate::frame::LandmarkSequence;

  #[test]
  fn writes_flat_record() {
    let sample = Sample::new("clip-01", LandmarkSequence::default());
    let result = PredictionResult::failed(ErrorKind::Input, "输入序列为空");
    let mut buf = Vec::new();
    StdoutOutput::write_line(&mut buf, &sample, &result).unwrap();

    let line = String::from_utf8(buf).unwrap();
    assert!(line.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["id"], "clip-01");
    assert_eq!(value["word"], serde_json::Value::Null);
    assert_eq!(value["confidence"], 0.0);
    assert_eq!(value["error"], "输入序列为空");
  }
}
