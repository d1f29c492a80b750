use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::Stage;
use crate::stages::{read_json, read_remote_json, tool_failed, write_json};
use crate::tool::ToolInvocation;

/// Per-leg means from the statistical engine (mm, mm, ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegSummary {
  /// Number of strides behind the means.
  pub size: f64,
  pub stride_length: f64,
  pub stride_width: f64,
  pub stride_time: f64,
}

/// What the statistical engine writes to `out/zGait/{trial}-summary.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
  pub left: LegSummary,
  pub right: LegSummary,
  pub cadence: f64,
  pub velocity: f64,
}

/// Both legs folded together, still in the engine's units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedSummary {
  pub stride_length: f64,
  pub stride_width: f64,
  pub stride_time: f64,
  pub cadence: f64,
  pub velocity: f64,
}

/// `(l·nl + r·nr) / (nl + nr)`; `None` when there are no samples.
pub fn weighted_mean(left: f64, left_size: f64, right: f64, right_size: f64) -> Option<f64> {
  let total = left_size + right_size;
  if total <= 0.0 {
    return None;
  }
  Some((left * left_size + right * right_size) / total)
}

impl StatsSummary {
  pub fn combine(&self) -> Option<WeightedSummary> {
    let StatsSummary { left, right, .. } = *self;
    let mean = |l: f64, r: f64| weighted_mean(l, left.size, r, right.size);
    Some(WeightedSummary {
      stride_length: mean(left.stride_length, right.stride_length)?,
      stride_width: mean(left.stride_width, right.stride_width)?,
      stride_time: mean(left.stride_time, right.stride_time)?,
      cadence: self.cadence,
      velocity: self.velocity,
    })
  }
}

/// Runs the statistical engine over the raw depth table. The result value is
/// a [`WeightedSummary`].
#[derive(Debug, Clone, Copy)]
pub struct REstimation;

#[async_trait]
impl Stage for REstimation {
  fn kind(&self) -> StageKind {
    StageKind::REstimation
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;
    let trial = ctx.trial();
    let raw = ctx.local(&format!("out/{trial}-raw.csv"));
    let table = ctx.local(&format!("out/{trial}.csv"));
    let report_dir = ctx.local("out/zGait/");
    let summary_path = report_dir.join(format!("{trial}-summary.json"));

    let invocation = ToolInvocation::new("gait_stats", ctx.local_dir())
      .path_arg(&raw)
      .path_arg(&table)
      .path_arg(&report_dir);
    ctx
      .env
      .tools
      .run(&invocation)
      .await
      .map_err(|e| tool_failed(ctx, e))?;

    let summary: StatsSummary = read_json(ctx, &summary_path).await?;
    let combined = summary.combine().ok_or_else(|| StageError::Computation {
      stage: ctx.kind.to_string(),
      message: "summary reports no strides for either leg".to_string(),
    })?;

    write_json(ctx, &report_dir.join(format!("{trial}-weighted.json")), &combined).await?;
    weighted_value(ctx, combined)
  }

  async fn recover(&self, ctx: &StageContext) -> Result<Value, StageError> {
    let relative = format!("out/zGait/{}-weighted.json", ctx.trial());
    let combined: WeightedSummary = read_remote_json(ctx, &relative).await?;
    weighted_value(ctx, combined)
  }
}

fn weighted_value(ctx: &StageContext, combined: WeightedSummary) -> Result<Value, StageError> {
  serde_json::to_value(combined).map_err(|e| StageError::Computation {
    stage: ctx.kind.to_string(),
    message: e.to_string(),
  })
}
