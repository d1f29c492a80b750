use serde::{Deserialize, Serialize};

use crate::error::GaitError;

/// Which leg a gait event or interval belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
  Left,
  Right,
}

impl std::fmt::Display for Leg {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Leg::Left => write!(f, "left"),
      Leg::Right => write!(f, "right"),
    }
  }
}

/// Per-leg reading for one frame, in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegSample {
  pub horizontal: f64,
  pub lateral: f64,
  pub depth: f64,
}

/// Both legs at one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
  pub left: LegSample,
  pub right: LegSample,
}

impl FrameSample {
  pub fn leg(&self, leg: Leg) -> &LegSample {
    match leg {
      Leg::Left => &self.left,
      Leg::Right => &self.right,
    }
  }
}

/// Ordered per-frame samples for one trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
  pub frames: Vec<FrameSample>,
}

impl SignalSeries {
  pub fn new(frames: Vec<FrameSample>) -> Self {
    Self { frames }
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  /// Left depth minus right depth, frame by frame.
  ///
  /// The sign flips when weight transfers from one leg to the other.
  pub fn depth_difference(&self) -> Vec<f64> {
    self
      .frames
      .iter()
      .map(|f| f.left.depth - f.right.depth)
      .collect()
  }

  pub fn frame(&self, index: usize) -> Result<&FrameSample, GaitError> {
    self.frames.get(index).ok_or(GaitError::FrameOutOfRange {
      frame: index,
      len: self.frames.len(),
    })
  }

  pub fn depth(&self, index: usize, leg: Leg) -> Result<f64, GaitError> {
    Ok(self.frame(index)?.leg(leg).depth)
  }
}

/// A weight-transfer event detected on one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaitEvent {
  pub frame: usize,
  pub leg: Leg,
}
