use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::Stage;
use crate::stages::tool_failed;
use crate::timestamps::repair_timestamp_file;
use crate::tool::{ToolInvocation, run_until_exists};

/// The SVO exporter intermittently exits without writing its video.
const EXPORT_ATTEMPTS: usize = 2;
const DEPTH_SENSING_ATTEMPTS: usize = 10;

/// Exports the stereo recording to `.avi`, then converts it to `.mp4`.
#[derive(Debug, Clone, Copy)]
pub struct SvoConversion;

#[async_trait]
impl Stage for SvoConversion {
  fn kind(&self) -> StageKind {
    StageKind::SvoConversion
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;
    let trial = ctx.trial();
    let svo = ctx.local(&format!("input/{trial}.svo"));
    let avi = ctx.local(&format!("out/{trial}.avi"));
    let mp4 = ctx.local(&format!("input/{trial}.mp4"));

    let export = ToolInvocation::new("svo_export", ctx.local_dir())
      .path_arg(&svo)
      .path_arg(&avi);
    let attempts = run_until_exists(
      ctx.env.tools.as_ref(),
      ctx.kind.as_str(),
      &export,
      EXPORT_ATTEMPTS,
      &avi,
    )
    .await?;
    info!(job_id = %ctx.job_id, attempts, "svo_exported");

    let convert = ToolInvocation::new("avi_to_mp4", ctx.local_dir())
      .path_arg(&avi)
      .path_arg(&mp4);
    ctx
      .env
      .tools
      .run(&convert)
      .await
      .map_err(|e| tool_failed(ctx, e))?;
    Ok(json!(true))
  }
}

/// Produces the raw per-frame depth table from the stereo recording and the
/// pose keypoints.
#[derive(Debug, Clone, Copy)]
pub struct SvoDepthSensing;

#[async_trait]
impl Stage for SvoDepthSensing {
  fn kind(&self) -> StageKind {
    StageKind::SvoDepthSensing
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;
    let trial = ctx.trial();
    let svo = ctx.local(&format!("input/{trial}.svo"));
    let timestamps = ctx.local(&format!("input/{trial}.txt"));
    let json_dir = ctx.local(&format!("out/{trial}-json/"));
    let raw = ctx.local(&format!("out/{trial}-raw.csv"));

    let repair = repair_timestamp_file(&timestamps, &json_dir).await?;
    info!(job_id = %ctx.job_id, ?repair, "timestamps_checked");

    let sense = ToolInvocation::new("depth_sensing", ctx.local_dir())
      .path_arg(&svo)
      .path_arg(&timestamps)
      .path_arg(&json_dir)
      .path_arg(&raw);
    let attempts = run_until_exists(
      ctx.env.tools.as_ref(),
      ctx.kind.as_str(),
      &sense,
      DEPTH_SENSING_ATTEMPTS,
      &raw,
    )
    .await?;
    info!(job_id = %ctx.job_id, attempts, "depth_sensed");
    Ok(json!(true))
  }
}
