//! Mapping of stage results to published job results.

use std::collections::HashMap;

use gaitflow_stage::StageKind;
use gaitflow_store::JobResult;
use serde_json::Value;
use tracing::warn;

use crate::error::PipelineError;
use crate::pipeline::SENTINEL;

/// Where a pipeline's clinical parameters come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
  /// The depth-estimation parameter set, already in cm, s, m/s, 1/min.
  GaitSummary,
  /// The statistical engine's weighted summary, in mm and ms.
  StatsSummary,
}

impl ResultSource {
  fn stage(self) -> StageKind {
    match self {
      ResultSource::GaitSummary => StageKind::DepthEstimation,
      ResultSource::StatsSummary => StageKind::REstimation,
    }
  }

  /// Divisors for stride length, stride width and stride time.
  fn scale(self) -> (f64, f64, f64) {
    match self {
      ResultSource::GaitSummary => (1.0, 1.0, 1.0),
      ResultSource::StatsSummary => (10.0, 10.0, 1000.0),
    }
  }

  /// The six published rows: stride length, stride width, stride time,
  /// velocity, cadence, turn time.
  pub fn publish(self, outputs: &HashMap<StageKind, Value>) -> Result<Vec<JobResult>, PipelineError> {
    let stage = self.stage();
    let summary = outputs.get(&stage).ok_or_else(|| PipelineError::InvalidResult {
      stage: stage.to_string(),
      message: "stage did not run".to_string(),
    })?;
    let field = |name: &str| {
      summary
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| PipelineError::InvalidResult {
          stage: stage.to_string(),
          message: format!("missing numeric field '{name}' in {summary}"),
        })
    };

    let (length_div, width_div, time_div) = self.scale();
    Ok(vec![
      JobResult::float("stride length", field("stride_length")? / length_div, "cm"),
      JobResult::float("stride width", field("stride_width")? / width_div, "cm"),
      JobResult::float("stride time", field("stride_time")? / time_div, "s"),
      JobResult::float("velocity", field("velocity")?, "m/s"),
      JobResult::float("cadence", field("cadence")?, "1/min"),
      JobResult::float("turn time", turn_time(outputs), "s"),
    ])
  }
}

fn turn_time(outputs: &HashMap<StageKind, Value>) -> f64 {
  match outputs.get(&StageKind::TurnTime).and_then(Value::as_f64) {
    Some(seconds) => seconds,
    None => {
      warn!(value = ?outputs.get(&StageKind::TurnTime), "turn_time_unavailable");
      SENTINEL
    }
  }
}
