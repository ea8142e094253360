// 该文件是 Shouyu （手语） 项目的一部分。
// src/frame.rs - 手部关键点帧定义
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// 每只手的关键点数量
///
/// 拓扑固定: 手腕=0, 拇指=1-4, 食指=5-8, 中指=9-12, 无名指=13-16, 小指=17-20
pub const LANDMARK_COUNT: usize = 21;
/// 每帧最多的手数
pub const MAX_HANDS: usize = 2;
/// 坐标轴数量 (x, y, z)
pub const AXES: usize = 3;

#[derive(Error, Debug)]
pub enum LandmarkError {
  #[error("JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("第 {frame} 帧第 {slot} 只手的关键点数量错误: 期望 {expected}, 实际 {found}")]
  PointCount {
    frame: usize,
    slot: usize,
    expected: usize,
    found: usize,
  },
}

/// 单个关键点，x/y 为归一化图像坐标，z 为相对深度
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
  x: f32,
  y: f32,
  z: f32,
}

impl LandmarkPoint {
  pub const fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }

  pub fn x(&self) -> f32 {
    self.x
  }

  pub fn y(&self) -> f32 {
    self.y
  }

  pub fn z(&self) -> f32 {
    self.z
  }

  pub fn coords(&self) -> [f32; AXES] {
    [self.x, self.y, self.z]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
  Left,
  Right,
  #[default]
  Unknown,
}

impl From<&str> for Handedness {
  fn from(tag: &str) -> Self {
    if tag.eq_ignore_ascii_case("left") {
      Handedness::Left
    } else if tag.eq_ignore_ascii_case("right") {
      Handedness::Right
    } else {
      Handedness::Unknown
    }
  }
}

/// 一只手在一帧中的 21 个关键点
#[derive(Debug, Clone, PartialEq)]
pub struct HandFrame {
  points: [LandmarkPoint; LANDMARK_COUNT],
  handedness: Handedness,
}

impl HandFrame {
  pub fn new(points: [LandmarkPoint; LANDMARK_COUNT], handedness: Handedness) -> Self {
    Self { points, handedness }
  }

  /// 所有关键点都在同一位置的手，主要用于构造测试数据
  pub fn uniform(point: LandmarkPoint) -> Self {
    Self::new([point; LANDMARK_COUNT], Handedness::Unknown)
  }

  pub fn points(&self) -> &[LandmarkPoint] {
    &self.points
  }

  pub fn handedness(&self) -> Handedness {
    self.handedness
  }
}

impl TryFrom<Vec<LandmarkPoint>> for HandFrame {
  type Error = Vec<LandmarkPoint>;

  fn try_from(points: Vec<LandmarkPoint>) -> Result<Self, Self::Error> {
    let points: [LandmarkPoint; LANDMARK_COUNT] = points.try_into()?;
    Ok(Self::new(points, Handedness::Unknown))
  }
}

/// 一次观测: 帧序号、可选时间戳，以及按检测顺序排列的手部槽位
///
/// 槽位为 `None` 表示该位置没有检测到手，后续槽位的位置保持不变。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationFrame {
  index: usize,
  timestamp_ms: Option<f64>,
  slots: Vec<Option<HandFrame>>,
}

impl ObservationFrame {
  pub fn new(index: usize, timestamp_ms: Option<f64>, mut slots: Vec<Option<HandFrame>>) -> Self {
    if slots.len() > MAX_HANDS {
      warn!(
        "第 {} 帧包含 {} 个手部槽位，仅保留前 {} 个",
        index,
        slots.len(),
        MAX_HANDS
      );
      slots.truncate(MAX_HANDS);
    }
    Self {
      index,
      timestamp_ms,
      slots,
    }
  }

  /// 只包含已检测到的手，按顺序占据槽位
  pub fn with_hands(index: usize, hands: Vec<HandFrame>) -> Self {
    Self::new(index, None, hands.into_iter().map(Some).collect())
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn timestamp_ms(&self) -> Option<f64> {
    self.timestamp_ms
  }

  pub fn slots(&self) -> &[Option<HandFrame>] {
    &self.slots
  }

  pub fn hand(&self, slot: usize) -> Option<&HandFrame> {
    self.slots.get(slot).and_then(Option::as_ref)
  }

  pub fn hands(&self) -> impl Iterator<Item = &HandFrame> {
    self.slots.iter().flatten()
  }

  pub fn has_hands(&self) -> bool {
    self.slots.iter().any(Option::is_some)
  }
}

/// 一次手语动作的完整关键点序列
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSequence {
  frames: Vec<ObservationFrame>,
}

impl LandmarkSequence {
  pub fn new(frames: Vec<ObservationFrame>) -> Self {
    Self { frames }
  }

  pub fn frames(&self) -> &[ObservationFrame] {
    &self.frames
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn from_json_str(json: &str) -> Result<Self, LandmarkError> {
    Ok(LabeledSequence::from_json_str(json)?.sequence)
  }
}

impl FromIterator<ObservationFrame> for LandmarkSequence {
  fn from_iter<T: IntoIterator<Item = ObservationFrame>>(iter: T) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

/// 带可选标签的序列，对应外部记录中的 `{word | label, frames}` 结构
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabeledSequence {
  pub label: Option<String>,
  pub sequence: LandmarkSequence,
}

impl LabeledSequence {
  pub fn from_json_str(json: &str) -> Result<Self, LandmarkError> {
    let raw: RawSequence = serde_json::from_str(json)?;
    Self::try_from(raw)
  }
}

// 外部输入的原始结构。点既可以是 {x, y, z} 映射，也可以是有序数组。

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
  Tuple(Vec<f32>),
  Mapping(MappingPoint),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingPoint {
  #[serde(default)]
  x: Option<f32>,
  #[serde(default)]
  y: Option<f32>,
  #[serde(default)]
  z: Option<f32>,
}

impl From<RawPoint> for LandmarkPoint {
  fn from(raw: RawPoint) -> Self {
    match raw {
      RawPoint::Mapping(point) => LandmarkPoint::new(
        point.x.unwrap_or(0.0),
        point.y.unwrap_or(0.0),
        point.z.unwrap_or(0.0),
      ),
      RawPoint::Tuple(coords) => {
        if coords.len() < AXES {
          debug!("关键点坐标不足 {} 个，缺失部分按 0 处理: {:?}", AXES, coords);
        }
        let coord = |i: usize| coords.get(i).copied().unwrap_or(0.0);
        LandmarkPoint::new(coord(0), coord(1), coord(2))
      }
    }
  }
}

pub type RawHand = Vec<RawPoint>;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawFrame {
  Hands(Vec<Option<RawHand>>),
  Record(RawFrameRecord),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFrameRecord {
  #[serde(default)]
  timestamp: Option<f64>,
  #[serde(default)]
  landmarks: Vec<Option<RawHand>>,
  #[serde(default)]
  handedness: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawSequence {
  Frames(Vec<Option<RawFrame>>),
  Record(RawSequenceRecord),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSequenceRecord {
  #[serde(default)]
  word: Option<String>,
  #[serde(default)]
  label: Option<String>,
  #[serde(default, alias = "landmarks")]
  frames: Vec<Option<RawFrame>>,
}

fn convert_hand(
  raw: RawHand,
  handedness: Handedness,
  frame: usize,
  slot: usize,
) -> Result<Option<HandFrame>, LandmarkError> {
  // 空列表表示该槽位没有手
  if raw.is_empty() {
    return Ok(None);
  }
  let points: Vec<LandmarkPoint> = raw.into_iter().map(LandmarkPoint::from).collect();
  let found = points.len();
  let points: [LandmarkPoint; LANDMARK_COUNT] =
    points.try_into().map_err(|_| LandmarkError::PointCount {
      frame,
      slot,
      expected: LANDMARK_COUNT,
      found,
    })?;
  Ok(Some(HandFrame::new(points, handedness)))
}

fn convert_frame(raw: Option<RawFrame>, index: usize) -> Result<ObservationFrame, LandmarkError> {
  let (timestamp, hands, handedness) = match raw {
    None => (None, Vec::new(), Vec::new()),
    Some(RawFrame::Hands(hands)) => (None, hands, Vec::new()),
    Some(RawFrame::Record(record)) => (record.timestamp, record.landmarks, record.handedness),
  };

  let slots = hands
    .into_iter()
    .enumerate()
    .map(|(slot, hand)| {
      let tag = handedness
        .get(slot)
        .map(|t| Handedness::from(t.as_str()))
        .unwrap_or_default();
      match hand {
        Some(hand) => convert_hand(hand, tag, index, slot),
        None => Ok(None),
      }
    })
    .collect::<Result<Vec<_>, _>>()?;

  Ok(ObservationFrame::new(index, timestamp, slots))
}

impl TryFrom<RawSequence> for LabeledSequence {
  type Error = LandmarkError;

  fn try_from(raw: RawSequence) -> Result<Self, Self::Error> {
    let (label, frames) = match raw {
      RawSequence::Frames(frames) => (None, frames),
      RawSequence::Record(record) => (record.word.or(record.label), record.frames),
    };

    let frames = frames
      .into_iter()
      .enumerate()
      .map(|(index, frame)| convert_frame(frame, index))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(LabeledSequence {
      label,
      sequence: LandmarkSequence::new(frames),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hand_json(point: &str) -> String {
    format!("[{}]", vec![point; LANDMARK_COUNT].join(","))
  }

  #[test]
  fn mapping_and_tuple_points_are_equivalent() {
    let mapping = format!("[[{}]]", hand_json(r#"{"x": 0.25, "y": 0.5, "z": -0.1}"#));
    let tuple = format!("[[{}]]", hand_json("[0.25, 0.5, -0.1]"));

    let a = LandmarkSequence::from_json_str(&mapping).unwrap();
    let b = LandmarkSequence::from_json_str(&tuple).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 1);
    assert_eq!(a.frames()[0].hand(0).unwrap().points()[20].coords(), [0.25f32, 0.5, -0.1]);
  }

  #[test]
  fn missing_keys_default_to_zero() {
    let json = format!("[[{}]]", hand_json(r#"{"x": 0.3}"#));
    let seq = LandmarkSequence::from_json_str(&json).unwrap();
    let point = seq.frames()[0].hand(0).unwrap().points()[0];
    assert_eq!(point, LandmarkPoint::new(0.3, 0.0, 0.0));
  }

  #[test]
  fn empty_hand_keeps_slot_position() {
    let json = format!("[[[], {}]]", hand_json("[0.1, 0.2, 0.3]"));
    let seq = LandmarkSequence::from_json_str(&json).unwrap();
    let frame = &seq.frames()[0];
    assert!(frame.hand(0).is_none());
    assert!(frame.hand(1).is_some());
    assert_eq!(frame.hands().count(), 1);
  }

  #[test]
  fn record_frames_carry_timestamp_and_handedness() {
    let json = format!(
      r#"{{"word": "hello", "frames": [{{"timestamp": 33.0, "landmarks": [{}], "handedness": ["Left"]}}, null]}}"#,
      hand_json("[0.1, 0.2, 0.3]")
    );
    let labeled = LabeledSequence::from_json_str(&json).unwrap();
    assert_eq!(labeled.label.as_deref(), Some("hello"));
    let frames = labeled.sequence.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].timestamp_ms(), Some(33.0));
    assert_eq!(frames[0].hand(0).unwrap().handedness(), Handedness::Left);
    assert!(!frames[1].has_hands());
    assert_eq!(frames[1].index(), 1);
  }

  #[test]
  fn wrong_point_count_is_rejected() {
    let json = r#"[[[[0.1, 0.2, 0.3], [0.1, 0.2, 0.3]]]]"#;
    match LandmarkSequence::from_json_str(json) {
      Err(LandmarkError::PointCount { found, .. }) => assert_eq!(found, 2),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  fn extra_hands_are_truncated() {
    let hand = HandFrame::uniform(LandmarkPoint::new(0.5, 0.5, 0.0));
    let frame = ObservationFrame::with_hands(0, vec![hand.clone(), hand.clone(), hand]);
    assert_eq!(frame.slots().len(), MAX_HANDS);
  }
}
