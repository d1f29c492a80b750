use serde::{Deserialize, Serialize};

use crate::error::GaitError;
use crate::interval::{GaitInterval, RatioBand};
use crate::signal::{Leg, SignalSeries};

/// Tunables for the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
  /// Camera frame rate in frames per second.
  pub frame_rate: f64,
  /// Events closer to the camera than this (mm) are unreliable and dropped.
  pub min_depth: f64,
  /// Multiplier applied to every stride length.
  pub stride_length_adjust: f64,
  pub band: RatioBand,
}

impl Default for ExtractorConfig {
  fn default() -> Self {
    Self {
      frame_rate: 30.0,
      min_depth: 1500.0,
      stride_length_adjust: 1.0,
      band: RatioBand::default(),
    }
  }
}

impl ExtractorConfig {
  pub fn validate(&self) -> Result<(), GaitError> {
    if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
      return Err(GaitError::InvalidConfig {
        message: format!("frame_rate must be positive, got {}", self.frame_rate),
      });
    }
    if !self.min_depth.is_finite() {
      return Err(GaitError::InvalidConfig {
        message: "min_depth must be finite".to_string(),
      });
    }
    if !(self.stride_length_adjust.is_finite() && self.stride_length_adjust > 0.0) {
      return Err(GaitError::InvalidConfig {
        message: format!(
          "stride_length_adjust must be positive, got {}",
          self.stride_length_adjust
        ),
      });
    }
    let RatioBand { lower, upper } = self.band;
    if !(lower > 0.0 && lower <= 1.0 && upper >= 1.0 && upper.is_finite()) {
      return Err(GaitError::InvalidConfig {
        message: format!("ratio band [{lower}, {upper}] must straddle 1.0"),
      });
    }
    Ok(())
  }
}

/// Clinical parameters for one retained interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrideParameters {
  pub start: usize,
  pub end: usize,
  pub leg: Leg,
  /// cm
  pub stride_length: f64,
  /// cm
  pub stride_width: f64,
  /// s
  pub stride_time: f64,
  /// m/s
  pub velocity: f64,
  /// steps per minute
  pub cadence: f64,
}

impl StrideParameters {
  pub fn compute(
    interval: &GaitInterval,
    series: &SignalSeries,
    config: &ExtractorConfig,
  ) -> Result<Self, GaitError> {
    let frames = interval.frames();
    if frames == 0 {
      return Err(GaitError::DegenerateInterval {
        start: interval.start,
        end: interval.end,
      });
    }

    let depth_start = series.depth(interval.start, interval.leg)?;
    let depth_end = series.depth(interval.end, interval.leg)?;
    let stride_length = (depth_end - depth_start).abs() / 10.0 * config.stride_length_adjust;

    let at_start = series.frame(interval.start)?;
    let stride_width = (at_start.left.lateral - at_start.right.lateral).abs() / 10.0;

    let stride_time = frames as f64 / config.frame_rate;

    Ok(Self {
      start: interval.start,
      end: interval.end,
      leg: interval.leg,
      stride_length,
      stride_width,
      stride_time,
      velocity: stride_length / 100.0 / stride_time,
      cadence: 60.0 / stride_time,
    })
  }
}

/// Mean of every parameter across the retained intervals of both legs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaitSummary {
  pub stride_length: f64,
  pub stride_width: f64,
  pub stride_time: f64,
  pub velocity: f64,
  pub cadence: f64,
  pub interval_count: usize,
}

pub fn summarize(strides: &[StrideParameters]) -> Result<GaitSummary, GaitError> {
  if strides.is_empty() {
    return Err(GaitError::insufficient("no intervals survived filtering"));
  }

  let n = strides.len() as f64;
  let mean = |f: fn(&StrideParameters) -> f64| strides.iter().map(f).sum::<f64>() / n;

  Ok(GaitSummary {
    stride_length: mean(|s| s.stride_length),
    stride_width: mean(|s| s.stride_width),
    stride_time: mean(|s| s.stride_time),
    velocity: mean(|s| s.velocity),
    cadence: mean(|s| s.cadence),
    interval_count: strides.len(),
  })
}
