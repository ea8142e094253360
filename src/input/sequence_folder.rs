// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/sequence_folder.rs - 序列目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::vec::IntoIter;

use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, Sample, sequence_file::read_sample},
};

/// `folder:///path/to/dir`，按文件名顺序逐个读取 `*.json`
pub struct SequenceFolderInput {
  files: IntoIter<PathBuf>,
}

impl FromUrlWithScheme for SequenceFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for SequenceFolderInput {
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

    let directory = PathBuf::from(url.path());
    let mut files: Vec<PathBuf> = std::fs::read_dir(&directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
      .collect();
    files.sort();

    info!("输入目录 {}: {} 个序列文件", directory.display(), files.len());
    Ok(Self {
      files: files.into_iter(),
    })
  }
}

impl Iterator for SequenceFolderInput {
  type Item = Sample;

  fn next(&mut self) -> Option<Self::Item> {
    self.files.next().map(|path| read_sample(&path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_json_files_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.json"), "[]").unwrap();
    std::fs::write(dir.path().join("a.json"), "[[], []]").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
    std::fs::write(dir.path().join("c.json"), "{broken").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let samples: Vec<Sample> = SequenceFolderInput::from_url(&url).unwrap().collect();
    let ids: Vec<&str> = samples.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
    assert_eq!(samples[0].sequence.as_ref().unwrap().len(), 2);
    assert!(samples[2].sequence.is_err());
  }
}
