//! Event detection: onsets, turn exclusion, directional split, depth filter.

use crate::error::GaitError;
use crate::signal::{Leg, SignalSeries};

/// First index of every maximal run of strictly positive values.
///
/// The onset rather than the peak is kept because the signal changes sign
/// right at the weight-transfer boundary.
pub fn region_onsets(signal: &[f64]) -> Vec<usize> {
  let mut onsets = Vec::new();
  let mut in_region = false;

  for (i, value) in signal.iter().enumerate() {
    if *value > 0.0 {
      if !in_region {
        onsets.push(i);
        in_region = true;
      }
    } else {
      in_region = false;
    }
  }

  onsets
}

/// Drop indices that fall on a turning frame.
pub fn exclude_turning(indices: &[usize], mask: &[bool]) -> Vec<usize> {
  indices
    .iter()
    .copied()
    .filter(|i| !mask.get(*i).copied().unwrap_or(false))
    .collect()
}

/// First and last frame of the single contiguous turning run.
pub fn turn_bounds(mask: &[bool]) -> Result<(usize, usize), GaitError> {
  let mut runs: Vec<(usize, usize)> = Vec::new();
  let mut start: Option<usize> = None;

  for (i, turning) in mask.iter().enumerate() {
    match (turning, start) {
      (true, None) => start = Some(i),
      (false, Some(s)) => {
        runs.push((s, i - 1));
        start = None;
      }
      _ => {}
    }
  }
  if let Some(s) = start {
    runs.push((s, mask.len() - 1));
  }

  match runs.as_slice() {
    [bounds] => Ok(*bounds),
    _ => Err(GaitError::AmbiguousTurnRegion { runs: runs.len() }),
  }
}

/// Split indices into those strictly before and strictly after the turn.
pub fn split_by_turn(indices: &[usize], bounds: (usize, usize)) -> (Vec<usize>, Vec<usize>) {
  let (first, last) = bounds;
  let forward = indices.iter().copied().filter(|i| *i < first).collect();
  let backward = indices.iter().copied().filter(|i| *i > last).collect();
  (forward, backward)
}

/// Keep only indices where the given leg is far enough from the camera.
pub fn filter_by_depth(
  indices: &[usize],
  series: &SignalSeries,
  leg: Leg,
  min_depth: f64,
) -> Result<Vec<usize>, GaitError> {
  let mut kept = Vec::with_capacity(indices.len());
  for index in indices {
    if series.depth(*index, leg)? >= min_depth {
      kept.push(*index);
    }
  }
  Ok(kept)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::signal::{FrameSample, LegSample};

  #[test]
  fn test_region_onsets() {
    let signal = [-1.0, 2.0, 3.0, -1.0, -2.0, 4.0, 5.0, 6.0, -1.0];
    assert_eq!(region_onsets(&signal), vec![1, 5]);
  }

  #[test]
  fn test_region_onsets_trailing_run_and_zero() {
    // zero is not positive and closes a run
    let signal = [1.0, 0.0, 1.0, 1.0];
    assert_eq!(region_onsets(&signal), vec![0, 2]);

    let negated: Vec<f64> = signal.iter().map(|v| -v).collect();
    assert!(region_onsets(&negated).is_empty());
  }

  #[test]
  fn test_exclude_turning() {
    let mut mask = vec![false; 10];
    mask[5] = true;
    assert_eq!(exclude_turning(&[1, 5, 9], &mask), vec![1, 9]);
  }

  #[test]
  fn test_split_by_turn() {
    let (forward, backward) = split_by_turn(&[2, 4, 9, 11], (6, 8));
    assert_eq!(forward, vec![2, 4]);
    assert_eq!(backward, vec![9, 11]);
  }

  #[test]
  fn test_split_drops_turn_bounds_themselves() {
    let (forward, backward) = split_by_turn(&[5, 6, 8, 9], (6, 8));
    assert_eq!(forward, vec![5]);
    assert_eq!(backward, vec![9]);
  }

  #[test]
  fn test_turn_bounds_single_run() {
    let mask = [false, false, true, true, true, false];
    assert_eq!(turn_bounds(&mask), Ok((2, 4)));

    let trailing = [false, true, true];
    assert_eq!(turn_bounds(&trailing), Ok((1, 2)));
  }

  #[test]
  fn test_turn_bounds_rejects_zero_or_many_runs() {
    assert_eq!(
      turn_bounds(&[false, false]),
      Err(GaitError::AmbiguousTurnRegion { runs: 0 })
    );
    assert_eq!(
      turn_bounds(&[true, false, true]),
      Err(GaitError::AmbiguousTurnRegion { runs: 2 })
    );
  }

  #[test]
  fn test_filter_by_depth() {
    let frames = [1000.0, 1600.0, 1500.0]
      .iter()
      .map(|d| FrameSample {
        left: LegSample {
          depth: *d,
          ..Default::default()
        },
        right: LegSample::default(),
      })
      .collect();
    let series = SignalSeries::new(frames);

    let kept = filter_by_depth(&[0, 1, 2], &series, Leg::Left, 1500.0).unwrap();
    assert_eq!(kept, vec![1, 2]);

    let err = filter_by_depth(&[7], &series, Leg::Left, 1500.0).unwrap_err();
    assert_eq!(err, GaitError::FrameOutOfRange { frame: 7, len: 3 });
  }
}
