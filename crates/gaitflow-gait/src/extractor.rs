use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::GaitError;
use crate::events::{exclude_turning, filter_by_depth, region_onsets, split_by_turn, turn_bounds};
use crate::interval::{GaitInterval, pair_consecutive, reject_outliers};
use crate::params::{ExtractorConfig, GaitSummary, StrideParameters, summarize};
use crate::signal::{GaitEvent, Leg, SignalSeries};

/// Everything the extractor learned about one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitReport {
  pub events: Vec<GaitEvent>,
  pub strides: Vec<StrideParameters>,
  pub summary: GaitSummary,
}

impl GaitReport {
  pub fn strides_for(&self, leg: Leg) -> impl Iterator<Item = &StrideParameters> {
    self.strides.iter().filter(move |s| s.leg == leg)
  }
}

/// Turns a depth signal and turning mask into stride parameters.
#[derive(Debug, Clone, Default)]
pub struct GaitExtractor {
  config: ExtractorConfig,
}

impl GaitExtractor {
  pub fn new(config: ExtractorConfig) -> Result<Self, GaitError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &ExtractorConfig {
    &self.config
  }

  #[instrument(name = "gait_extract", skip_all, fields(frames = series.len()))]
  pub fn extract(&self, series: &SignalSeries, mask: &[bool]) -> Result<GaitReport, GaitError> {
    if mask.len() != series.len() {
      return Err(GaitError::MaskLengthMismatch {
        mask: mask.len(),
        signal: series.len(),
      });
    }
    if series.is_empty() {
      return Err(GaitError::insufficient("empty signal"));
    }

    let diff = series.depth_difference();
    let negated: Vec<f64> = diff.iter().map(|v| -v).collect();

    let positive = exclude_turning(&region_onsets(&diff), mask);
    let negative = exclude_turning(&region_onsets(&negated), mask);

    let bounds = turn_bounds(mask)?;
    let (positive_fwd, positive_bwd) = split_by_turn(&positive, bounds);
    let (negative_fwd, negative_bwd) = split_by_turn(&negative, bounds);

    // walking away the right leg leads on positive onsets; coming back it is
    // the left leg
    let right_fwd = filter_by_depth(&positive_fwd, series, Leg::Right, self.config.min_depth)?;
    let left_bwd = filter_by_depth(&positive_bwd, series, Leg::Left, self.config.min_depth)?;
    let left_fwd = filter_by_depth(&negative_fwd, series, Leg::Left, self.config.min_depth)?;
    let right_bwd = filter_by_depth(&negative_bwd, series, Leg::Right, self.config.min_depth)?;

    let mut events: Vec<GaitEvent> = [
      (&right_fwd, Leg::Right),
      (&right_bwd, Leg::Right),
      (&left_fwd, Leg::Left),
      (&left_bwd, Leg::Left),
    ]
    .into_iter()
    .flat_map(|(frames, leg)| frames.iter().map(move |frame| GaitEvent { frame: *frame, leg }))
    .collect();
    events.sort_by_key(|e| e.frame);

    let right = self.leg_intervals(&right_fwd, &right_bwd, Leg::Right)?;
    let left = self.leg_intervals(&left_fwd, &left_bwd, Leg::Left)?;

    debug!(
      turn_start = bounds.0,
      turn_end = bounds.1,
      right_intervals = right.len(),
      left_intervals = left.len(),
      "gait_intervals_retained"
    );

    let strides = right
      .iter()
      .chain(left.iter())
      .map(|interval| StrideParameters::compute(interval, series, &self.config))
      .collect::<Result<Vec<_>, _>>()?;

    let summary = summarize(&strides)?;

    Ok(GaitReport {
      events,
      strides,
      summary,
    })
  }

  fn leg_intervals(
    &self,
    forward: &[usize],
    backward: &[usize],
    leg: Leg,
  ) -> Result<Vec<GaitInterval>, GaitError> {
    let mut intervals = pair_consecutive(forward, leg)?;
    intervals.extend(pair_consecutive(backward, leg)?);
    Ok(reject_outliers(intervals, self.config.band))
  }
}
