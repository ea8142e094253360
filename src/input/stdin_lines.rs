// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/stdin_lines.rs - 标准输入 JSON 行
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::{self, BufRead, BufReader, Read};

use tracing::{error, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::LandmarkError,
  input::{InputError, Sample},
};

/// `stdin://`，每行一个 JSON 序列，空行跳过
pub struct StdinLinesInput {
  reader: Box<dyn BufRead + Send>,
  line: usize,
}

impl FromUrlWithScheme for StdinLinesInput {
  const SCHEME: &'static str = "stdin";
}

impl FromUrl for StdinLinesInput {
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
    Ok(Self::from_reader(std::io::stdin()))
  }
}

impl StdinLinesInput {
  pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
    Self {
      reader: Box::new(BufReader::new(reader)),
      line: 0,
    }
  }
}

impl Iterator for StdinLinesInput {
  type Item = Sample;

  fn next(&mut self) -> Option<Self::Item> {
    let mut buf = Vec::new();
    loop {
      buf.clear();
      match self.reader.read_until(b'\n', &mut buf) {
        Ok(0) => return None,
        Ok(_) => {
          self.line += 1;
          let id = format!("line-{}", self.line);
          // 非 UTF-8 的行只影响这一个样本
          let text = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim(),
            Err(err) => {
              warn!("{} 不是有效的 UTF-8: {}", id, err);
              let err = io::Error::new(io::ErrorKind::InvalidData, err);
              return Some(Sample {
                id,
                sequence: Err(LandmarkError::Io(err)),
              });
            }
          };
          if text.is_empty() {
            continue;
          }
          return Some(Sample::parse(id, text));
        }
        Err(err) => {
          warn!("读取标准输入失败，停止: {}", err);
          return None;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn each_line_is_a_sample() {
    let data = "[[]]\n\n[[], []]\nnot json\n";
    let samples: Vec<Sample> = StdinLinesInput::from_reader(std::io::Cursor::new(data)).collect();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].id, "line-1");
    assert_eq!(samples[1].id, "line-3");
    assert_eq!(samples[1].sequence.as_ref().unwrap().len(), 2);
    assert!(samples[2].sequence.is_err());
  }

  #[test]
  fn invalid_utf8_line_does_not_end_the_stream() {
    let data = b"[[]]\n\xff\xfe\n[[], []]\n".to_vec();
    let samples: Vec<Sample> = StdinLinesInput::from_reader(std::io::Cursor::new(data)).collect();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].id, "line-1");
    assert_eq!(samples[1].id, "line-2");
    assert!(matches!(samples[1].sequence, Err(LandmarkError::Io(_))));
    assert_eq!(samples[2].id, "line-3");
    assert_eq!(samples[2].sequence.as_ref().unwrap().len(), 2);
  }
}
