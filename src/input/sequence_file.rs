// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/sequence_file.rs - 单个序列文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, Sample},
};

pub(crate) fn sample_id(path: &std::path::Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}

/// 读取失败也会产生一个样本，错误交给分发器转换为结果
pub(crate) fn read_sample(path: &std::path::Path) -> Sample {
  let id = sample_id(path);
  match std::fs::read_to_string(path) {
    Ok(data) => Sample::parse(id, &data),
    Err(err) => {
      error!("读取 {} 失败: {}", path.display(), err);
      Sample {
        id,
        sequence: Err(err.into()),
      }
    }
  }
}

/// `file:///path/to/sequence.json`，只产生一个样本
pub struct SequenceFileInput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for SequenceFileInput {
  const SCHEME: &'static str = "file";
}

impl FromUrl for SequenceFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }

    let path = PathBuf::from(url.path());
    // 提前检查，路径错误时在启动阶段失败
    std::fs::metadata(&path)?;
    info!("输入文件: {}", path.display());
    Ok(Self { path: Some(path) })
  }
}

impl Iterator for SequenceFileInput {
  type Item = Sample;

  fn next(&mut self) -> Option<Self::Item> {
    self.path.take().map(|path| read_sample(&path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_one_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.json");
    std::fs::write(&path, "[[]]").unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let mut input = SequenceFileInput::from_url(&url).unwrap();
    let sample = input.next().unwrap();
    assert_eq!(sample.id, "hello");
    assert_eq!(sample.sequence.unwrap().len(), 1);
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_file_fails_early() {
    let url = Url::parse("file:///definitely/not/here.json").unwrap();
    assert!(matches!(
      SequenceFileInput::from_url(&url),
      Err(InputError::Io(_))
    ));
  }
}
