use async_trait::async_trait;
use gaitflow_gait::{GaitExtractor, GaitReport, SignalSeries};
use serde_json::Value;
use tracing::info;

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::Stage;
use crate::stages::{TurnTimeOutput, read_json, read_remote_json, tool_failed, write_json};
use crate::tool::ToolInvocation;

/// Lifts 2D keypoints to a per-frame leg depth signal, then extracts gait
/// cycles from it.
///
/// The depth estimator writes the signal; the turning mask comes from the
/// turn-time output. The result value is the aggregated parameter set.
#[derive(Debug, Clone, Copy)]
pub struct DepthEstimation;

#[async_trait]
impl Stage for DepthEstimation {
  fn kind(&self) -> StageKind {
    StageKind::DepthEstimation
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;
    let trial = ctx.trial();
    let dataset = ctx.local(&format!("out/{trial}-custom-dataset.npz"));
    let keypoints = ctx.local(&format!("out/3d/{trial}.mp4.npy"));
    let turn_path = ctx.local(&format!("out/{trial}-tt.json"));
    let signal_path = ctx.local(&format!("out/{trial}-signal.json"));
    let gait_path = ctx.local(&format!("out/{trial}-gait.json"));

    let mut invocation = ToolInvocation::new("depth_estimator", ctx.local_dir())
      .path_arg(&dataset)
      .path_arg(&keypoints)
      .path_arg(&signal_path);
    if let Some(focal_length) = ctx.params.focal_length {
      invocation = invocation.arg("--focal-length").arg(focal_length.to_string());
    }
    if let Some(height) = ctx.params.subject_height {
      invocation = invocation.arg("--height").arg(height.to_string());
    }
    ctx
      .env
      .tools
      .run(&invocation)
      .await
      .map_err(|e| tool_failed(ctx, e))?;

    let series: SignalSeries = read_json(ctx, &signal_path).await?;
    let turn: TurnTimeOutput = read_json(ctx, &turn_path).await?;

    let report = GaitExtractor::new(ctx.env.extractor)?.extract(&series, &turn.mask)?;
    info!(
      job_id = %ctx.job_id,
      strides = report.strides.len(),
      stride_length = report.summary.stride_length,
      "gait_extracted"
    );

    write_json(ctx, &gait_path, &report).await?;
    summary_value(ctx, &report)
  }

  async fn recover(&self, ctx: &StageContext) -> Result<Value, StageError> {
    let report: GaitReport = read_remote_json(ctx, &format!("out/{}-gait.json", ctx.trial())).await?;
    summary_value(ctx, &report)
  }
}

fn summary_value(ctx: &StageContext, report: &GaitReport) -> Result<Value, StageError> {
  serde_json::to_value(&report.summary).map_err(|e| StageError::Computation {
    stage: ctx.kind.to_string(),
    message: e.to_string(),
  })
}
