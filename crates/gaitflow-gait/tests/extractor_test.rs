use gaitflow_gait::{FrameSample, GaitExtractor, Leg, LegSample, SignalSeries};

const FRAMES: usize = 300;
const TURN: std::ops::Range<usize> = 140..160;

/// Subject walks away for 150 frames and back for 150, with weight transfer
/// every 20 frames once walking starts at frame 10.
fn synthetic_walk() -> (SignalSeries, Vec<bool>) {
  let frames = (0..FRAMES)
    .map(|t| {
      let swing = if t < 10 {
        0.0
      } else if (t - 10) % 40 < 20 {
        200.0
      } else {
        -200.0
      };
      let base = if t < 150 {
        2000.0 + 10.0 * t as f64
      } else {
        2000.0 + 10.0 * (FRAMES - t) as f64
      };
      FrameSample {
        left: LegSample {
          horizontal: 0.0,
          lateral: 100.0,
          depth: base + swing / 2.0,
        },
        right: LegSample {
          horizontal: 0.0,
          lateral: -100.0,
          depth: base - swing / 2.0,
        },
      }
    })
    .collect();

  let mask = (0..FRAMES).map(|t| TURN.contains(&t)).collect();
  (SignalSeries::new(frames), mask)
}

#[test]
fn test_extracts_every_clean_cycle() {
  let (series, mask) = synthetic_walk();
  let report = GaitExtractor::default().extract(&series, &mask).unwrap();

  assert_eq!(report.strides_for(Leg::Right).count(), 5);
  assert_eq!(report.strides_for(Leg::Left).count(), 5);
  assert_eq!(report.summary.interval_count, 10);

  for stride in &report.strides {
    assert_eq!(stride.end - stride.start, 40);
    assert!(stride.stride_length >= 0.0);
    assert!(stride.stride_width >= 0.0);
    assert!(stride.velocity >= 0.0);
    assert!(!TURN.contains(&stride.start) && !TURN.contains(&stride.end));
  }

  let summary = report.summary;
  assert!((summary.stride_length - 40.0).abs() < 1e-9);
  assert!((summary.stride_width - 20.0).abs() < 1e-9);
  assert!((summary.stride_time - 40.0 / 30.0).abs() < 1e-9);
  assert!((summary.velocity - 0.3).abs() < 1e-9);
  assert!((summary.cadence - 45.0).abs() < 1e-9);
}

#[test]
fn test_right_leg_strides_listed_first() {
  let (series, mask) = synthetic_walk();
  let report = GaitExtractor::default().extract(&series, &mask).unwrap();

  let legs: Vec<Leg> = report.strides.iter().map(|s| s.leg).collect();
  assert!(legs[..5].iter().all(|l| *l == Leg::Right));
  assert!(legs[5..].iter().all(|l| *l == Leg::Left));

  // forward right events come from positive onsets before the turn
  let first_right = report.strides_for(Leg::Right).next().unwrap();
  assert_eq!((first_right.start, first_right.end), (10, 50));
}

#[test]
fn test_events_are_sorted_and_skip_turn() {
  let (series, mask) = synthetic_walk();
  let report = GaitExtractor::default().extract(&series, &mask).unwrap();

  let frames: Vec<usize> = report.events.iter().map(|e| e.frame).collect();
  let mut sorted = frames.clone();
  sorted.sort_unstable();
  assert_eq!(frames, sorted);
  assert!(frames.iter().all(|f| !TURN.contains(f)));
}

#[test]
fn test_close_range_events_are_filtered() {
  let (mut series, mask) = synthetic_walk();
  // pull the subject inside the minimum depth for the whole backward leg
  for frame in series.frames.iter_mut().skip(160) {
    let shift = (frame.left.depth + frame.right.depth) / 2.0 - 1000.0;
    frame.left.depth -= shift;
    frame.right.depth -= shift;
  }
  let report = GaitExtractor::default().extract(&series, &mask).unwrap();

  assert!(report.strides.iter().all(|s| s.end < TURN.start));
  assert_eq!(report.summary.interval_count, 5);
}

#[test]
fn test_report_serializes() {
  let (series, mask) = synthetic_walk();
  let report = GaitExtractor::default().extract(&series, &mask).unwrap();

  let json = serde_json::to_value(&report).unwrap();
  assert_eq!(json["summary"]["interval_count"], 10);
  assert_eq!(json["strides"][0]["leg"], "right");
}
