// 该文件是 Shouyu （手语） 项目的一部分。
// tests/pipeline.rs - 端到端预测流程
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;
use std::sync::Arc;

use url::Url;

use shouyu::{
  FromUrl,
  dispatch::{Dispatcher, ErrorKind, PredictionContext, PredictorConfig, SharedContext, Strategy},
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

/// 每帧一只手，所有点位于 (x(i), 0.5, 0.1)
fn sequence_json(frames: usize, x: impl Fn(usize) -> f32) -> String {
  let frames: Vec<serde_json::Value> = (0..frames)
    .map(|i| {
      let point = serde_json::json!({"x": x(i), "y": 0.5, "z": 0.1});
      serde_json::json!([vec![point; 21]])
    })
    .collect();
  serde_json::Value::Array(frames).to_string()
}

fn sign_json(word: &str, frames: usize, x: impl Fn(usize) -> f32) -> String {
  format!(r#"{{"word": "{}", "frames": {}}}"#, word, sequence_json(frames, x))
}

fn scheme_url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

const SPLIT_MODEL: &str = r#"{
  "labels": ["low", "high"],
  "feature_mode": "stat30",
  "decision": {
    "kind": "random_forest",
    "trees": [{"nodes": [
      {"split": {"feature": 0, "threshold": 0.5, "left": 1, "right": 2}},
      {"leaf": {"value": [9.0, 1.0]}},
      {"leaf": {"value": [0.0, 4.0]}}
    ]}]
  },
  "metadata": {"name": "split", "accuracy": 0.92, "cv_score": 0.88, "timestamp": "2026-01-01T00:00:00"}
}"#;

fn dispatcher(context: PredictionContext) -> Dispatcher {
  Dispatcher::new(PredictorConfig::default(), Arc::new(SharedContext::new(context)))
}

#[test]
fn model_loaded_from_url_classifies() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("model.json");
  std::fs::write(&path, SPLIT_MODEL).unwrap();

  let context = PredictionContext::load(Some(&scheme_url("model", &path)), None);
  assert!(context.has_models());
  let dispatcher = dispatcher(context);

  let low = dispatcher.predict_json(&sequence_json(5, |_| 0.3));
  assert_eq!(low.word.as_deref(), Some("low"));
  assert!((low.confidence - 90.0).abs() < 1e-3);
  assert_eq!(low.strategy, Some(Strategy::Classifier));

  let high = dispatcher.predict_json(&sequence_json(5, |_| 0.7));
  assert_eq!(high.word.as_deref(), Some("high"));
  assert_eq!(high.confidence, 100.0);
}

#[test]
fn model_directory_loads_every_model_by_name() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("split_20260101.json"), SPLIT_MODEL).unwrap();
  std::fs::write(
    dir.path().join("constant_20260102.json"),
    SPLIT_MODEL.replace(r#""name": "split""#, r#""name": "flipped""#)
      .replace("[9.0, 1.0]", "[1.0, 9.0]"),
  )
  .unwrap();
  std::fs::write(dir.path().join("broken.json"), "{").unwrap();
  std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

  let context = PredictionContext::load(Some(&scheme_url("model", dir.path())), None);
  assert_eq!(context.models.names(), vec!["flipped", "split"]);

  let summaries = context.models.summaries();
  assert_eq!(summaries[1].accuracy, Some(0.92));
  assert_eq!(summaries[1].timestamp.as_deref(), Some("2026-01-01T00:00:00"));

  let config = PredictorConfig {
    model_name: Some("split".to_string()),
    ..PredictorConfig::default()
  };
  let dispatcher = Dispatcher::new(config, Arc::new(SharedContext::new(context)));
  let input = sequence_json(5, |_| 0.3);

  let split = dispatcher.predict_json(&input);
  assert_eq!(split.word.as_deref(), Some("low"));
  assert_eq!(split.model.as_deref(), Some("split"));

  let sequence = shouyu::frame::LandmarkSequence::from_json_str(&input).unwrap();
  let flipped = dispatcher.predict_with(&sequence, Some("flipped"));
  assert_eq!(flipped.word.as_deref(), Some("high"));

  let missing = dispatcher.predict_with(&sequence, Some("svm"));
  assert_eq!(missing.error_kind, Some(ErrorKind::UnknownModel));
  assert!(missing.error.unwrap().contains("svm"));
}

#[test]
fn library_directory_matches_constant_sign() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("a.json"), sign_json("A", 10, |_| 0.5)).unwrap();
  std::fs::write(
    dir.path().join("b.json"),
    sign_json("B", 10, |i| 0.5 + 0.01 * i as f32),
  )
  .unwrap();

  let context = PredictionContext::load(None, Some(&scheme_url("library", dir.path())));
  assert_eq!(context.library.as_ref().map(|l| l.len()), Some(2));

  let result = dispatcher(context).predict_json(&sequence_json(10, |_| 0.5));
  assert_eq!(result.word.as_deref(), Some("A"));
  assert_eq!(result.confidence, 100.0);
  assert_eq!(result.strategy, Some(Strategy::Matcher));
}

#[test]
fn broken_model_falls_back_to_library() {
  let dir = tempfile::tempdir().unwrap();
  let model = dir.path().join("model.json");
  std::fs::write(&model, r#"{"labels": ["a", "a"], "decision": {"kind": "mlp", "layers": []}}"#)
    .unwrap();
  let library = dir.path().join("library.json");
  std::fs::write(&library, format!("[{}]", sign_json("A", 4, |_| 0.5))).unwrap();

  let context = PredictionContext::load(
    Some(&scheme_url("model", &model)),
    Some(&scheme_url("library", &library)),
  );
  assert!(!context.has_models());

  let result = dispatcher(context).predict_json(&sequence_json(4, |_| 0.5));
  assert_eq!(result.word.as_deref(), Some("A"));
}

#[test]
fn unparseable_input_is_reported_not_raised() {
  let result = dispatcher(PredictionContext::default()).predict_json(r#"[[[{"x": "oops"}]]]"#);
  assert_eq!(result.word, None);
  assert_eq!(result.confidence, 0.0);
  assert_eq!(result.error_kind, Some(ErrorKind::Input));
}

#[test]
fn folder_to_folder_task_records_every_sample() {
  let input_dir = tempfile::tempdir().unwrap();
  let output_dir = tempfile::tempdir().unwrap();
  std::fs::write(input_dir.path().join("1.json"), sequence_json(6, |_| 0.3)).unwrap();
  std::fs::write(input_dir.path().join("2.json"), "[]").unwrap();
  std::fs::write(input_dir.path().join("3.json"), sequence_json(6, |_| 0.8)).unwrap();

  let model_path = input_dir.path().join("model.txt");
  std::fs::write(&model_path, SPLIT_MODEL).unwrap();
  let context = PredictionContext::load(Some(&scheme_url("model", &model_path)), None);

  let input = InputWrapper::from_url(&scheme_url("folder", input_dir.path())).unwrap();
  let output_url = Url::parse(&format!("folder://{}?always", output_dir.path().display())).unwrap();
  let output = OutputWrapper::from_url(&output_url).unwrap();

  ContinuousTask::default()
    .run_task(input, dispatcher(context), output)
    .unwrap();

  let mut records = Vec::new();
  let mut stack = vec![output_dir.path().to_path_buf()];
  while let Some(dir) = stack.pop() {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        stack.push(path);
      } else {
        let value: serde_json::Value =
          serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        records.push(value);
      }
    }
  }
  records.sort_by_key(|r| r["id"].as_str().map(str::to_string));

  assert_eq!(records.len(), 3);
  assert_eq!(records[0]["word"], "low");
  assert_eq!(records[1]["word"], serde_json::Value::Null);
  assert!(records[1]["error"].is_string());
  assert_eq!(records[2]["word"], "high");
}

#[test]
fn unknown_schemes_are_rejected() {
  let url = Url::parse("rtsp://camera/stream").unwrap();
  assert!(InputWrapper::from_url(&url).is_err());
  assert!(OutputWrapper::from_url(&url).is_err());
}
