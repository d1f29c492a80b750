use serde::{Deserialize, Serialize};

use crate::error::GaitError;
use crate::signal::Leg;

/// Frame range between two consecutive same-leg events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaitInterval {
  pub start: usize,
  pub end: usize,
  pub leg: Leg,
}

impl GaitInterval {
  pub fn new(start: usize, end: usize, leg: Leg) -> Result<Self, GaitError> {
    if start >= end {
      return Err(GaitError::DegenerateInterval { start, end });
    }
    Ok(Self { start, end, leg })
  }

  /// Length in frames. Always at least one.
  pub fn frames(&self) -> usize {
    self.end - self.start
  }
}

/// Accepted band around the median interval length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBand {
  pub lower: f64,
  pub upper: f64,
}

impl Default for RatioBand {
  fn default() -> Self {
    Self {
      lower: 0.7,
      upper: 1.3,
    }
  }
}

/// Pair each sorted index with its successor.
pub fn pair_consecutive(indices: &[usize], leg: Leg) -> Result<Vec<GaitInterval>, GaitError> {
  indices
    .windows(2)
    .map(|pair| GaitInterval::new(pair[0], pair[1], leg))
    .collect()
}

/// Median of the interval lengths; the mean of the two middle values for an
/// even count.
pub fn median_length(intervals: &[GaitInterval]) -> Option<f64> {
  if intervals.is_empty() {
    return None;
  }
  let mut lengths: Vec<usize> = intervals.iter().map(GaitInterval::frames).collect();
  lengths.sort_unstable();

  let mid = lengths.len() / 2;
  let median = if lengths.len() % 2 == 0 {
    (lengths[mid - 1] + lengths[mid]) as f64 / 2.0
  } else {
    lengths[mid] as f64
  };
  Some(median)
}

/// Drop intervals whose length falls outside the band around the median.
pub fn reject_outliers(intervals: Vec<GaitInterval>, band: RatioBand) -> Vec<GaitInterval> {
  let Some(median) = median_length(&intervals) else {
    return intervals;
  };

  intervals
    .into_iter()
    .filter(|interval| {
      let len = interval.frames() as f64;
      len >= median * band.lower && len <= median * band.upper
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn intervals_with_lengths(lengths: &[usize]) -> Vec<GaitInterval> {
    let mut start = 0;
    lengths
      .iter()
      .map(|len| {
        let interval = GaitInterval::new(start, start + len, Leg::Left).unwrap();
        start += len;
        interval
      })
      .collect()
  }

  #[test]
  fn test_degenerate_interval_rejected() {
    assert_eq!(
      GaitInterval::new(4, 4, Leg::Right),
      Err(GaitError::DegenerateInterval { start: 4, end: 4 })
    );
    assert!(GaitInterval::new(5, 4, Leg::Right).is_err());
  }

  #[test]
  fn test_pair_consecutive() {
    let intervals = pair_consecutive(&[3, 10, 18], Leg::Right).unwrap();
    assert_eq!(intervals.len(), 2);
    assert_eq!((intervals[0].start, intervals[0].end), (3, 10));
    assert_eq!((intervals[1].start, intervals[1].end), (10, 18));

    assert!(pair_consecutive(&[3], Leg::Right).unwrap().is_empty());
    assert!(pair_consecutive(&[3, 3], Leg::Right).is_err());
  }

  #[test]
  fn test_median_length() {
    assert_eq!(median_length(&[]), None);
    assert_eq!(median_length(&intervals_with_lengths(&[10, 10, 10, 3])), Some(10.0));
    assert_eq!(median_length(&intervals_with_lengths(&[4, 9, 6])), Some(6.0));
    assert_eq!(median_length(&intervals_with_lengths(&[4, 8])), Some(6.0));
  }

  #[test]
  fn test_reject_outliers_drops_short_interval() {
    let kept = reject_outliers(intervals_with_lengths(&[10, 10, 10, 3]), RatioBand::default());
    let lengths: Vec<usize> = kept.iter().map(GaitInterval::frames).collect();
    assert_eq!(lengths, vec![10, 10, 10]);
  }

  #[test]
  fn test_reject_outliers_band_edges_inclusive() {
    // 7 and 13 sit exactly on 0.7x and 1.3x of the median
    let kept = reject_outliers(
      intervals_with_lengths(&[10, 10, 7, 13, 14]),
      RatioBand::default(),
    );
    let lengths: Vec<usize> = kept.iter().map(GaitInterval::frames).collect();
    assert_eq!(lengths, vec![10, 10, 7, 13]);
  }
}
