// 该文件是 Shouyu （手语） 项目的一部分。
// src/input.rs - 关键点序列输入
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{LandmarkError, LandmarkSequence},
};

/// 一个待预测的样本，解析失败也作为样本交给分发器处理
#[derive(Debug)]
pub struct Sample {
  pub id: String,
  pub sequence: Result<LandmarkSequence, LandmarkError>,
}

impl Sample {
  pub fn new(id: impl Into<String>, sequence: LandmarkSequence) -> Self {
    Self {
      id: id.into(),
      sequence: Ok(sequence),
    }
  }

  pub fn parse(id: impl Into<String>, json: &str) -> Self {
    Self {
      id: id.into(),
      sequence: LandmarkSequence::from_json_str(json),
    }
  }
}

mod sequence_file;
mod sequence_folder;
mod stdin_lines;

pub use self::sequence_file::SequenceFileInput;
pub use self::sequence_folder::SequenceFolderInput;
pub use self::stdin_lines::StdinLinesInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

pub enum InputWrapper {
  SequenceFile(SequenceFileInput),
  SequenceFolder(SequenceFolderInput),
  StdinLines(StdinLinesInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SequenceFileInput::SCHEME => Ok(InputWrapper::SequenceFile(SequenceFileInput::from_url(
        url,
      )?)),
      SequenceFolderInput::SCHEME => Ok(InputWrapper::SequenceFolder(
        SequenceFolderInput::from_url(url)?,
      )),
      StdinLinesInput::SCHEME => Ok(InputWrapper::StdinLines(StdinLinesInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Sample;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::SequenceFile(input) => input.next(),
      InputWrapper::SequenceFolder(input) => input.next(),
      InputWrapper::StdinLines(input) => input.next(),
    }
  }
}
