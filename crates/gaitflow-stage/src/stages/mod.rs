//! The concrete gait stages.

mod depth;
mod external;
mod r_estimation;
mod svo;
mod turn_time;

pub use depth::DepthEstimation;
pub use external::ExternalToolStage;
pub use r_estimation::{LegSummary, REstimation, StatsSummary, WeightedSummary, weighted_mean};
pub use svo::{SvoConversion, SvoDepthSensing};
pub use turn_time::{TurnTime, TurnTimeOutput};

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::StageContext;
use crate::error::{StageError, ToolError};
use crate::kind::StageKind;
use crate::stage::Stage;

/// The stage implementation for `kind`.
pub fn build_stage(kind: StageKind) -> Box<dyn Stage> {
  match kind {
    StageKind::SvoConversion => Box::new(SvoConversion),
    StageKind::Openpose => Box::new(ExternalToolStage::new(kind, "openpose")),
    StageKind::TrackAndExtract => Box::new(ExternalToolStage::new(kind, "tracker")),
    StageKind::SvoDepthSensing => Box::new(SvoDepthSensing),
    StageKind::TurnTime => Box::new(TurnTime),
    StageKind::DepthEstimation => Box::new(DepthEstimation),
    StageKind::REstimation => Box::new(REstimation),
    StageKind::VideoGeneration2d => Box::new(ExternalToolStage::new(kind, "render_2d")),
    StageKind::VideoGeneration3d => Box::new(ExternalToolStage::new(kind, "render_3d")),
  }
}

pub(crate) fn tool_failed(ctx: &StageContext, source: ToolError) -> StageError {
  StageError::Tool {
    stage: ctx.kind.to_string(),
    source,
  }
}

pub(crate) async fn read_json<T: DeserializeOwned>(
  ctx: &StageContext,
  path: &Path,
) -> Result<T, StageError> {
  let invalid = |message: String| StageError::InvalidOutput {
    stage: ctx.kind.to_string(),
    path: path.to_path_buf(),
    message,
  };
  let content = tokio::fs::read(path).await.map_err(|e| invalid(e.to_string()))?;
  serde_json::from_slice(&content).map_err(|e| invalid(e.to_string()))
}

/// Parse an output the stage uploaded earlier, straight from the remote store.
pub(crate) async fn read_remote_json<T: DeserializeOwned>(
  ctx: &StageContext,
  relative: &str,
) -> Result<T, StageError> {
  let remote = ctx.remote(relative);
  let content = ctx
    .env
    .sync
    .read(&remote)
    .await
    .map_err(|source| StageError::Transfer {
      stage: ctx.kind.to_string(),
      path: remote.clone(),
      source,
    })?;
  serde_json::from_slice(&content).map_err(|e| StageError::InvalidOutput {
    stage: ctx.kind.to_string(),
    path: remote.into(),
    message: e.to_string(),
  })
}

pub(crate) async fn write_json<T: Serialize>(
  ctx: &StageContext,
  path: &Path,
  value: &T,
) -> Result<(), StageError> {
  let content = serde_json::to_vec_pretty(value).map_err(|e| StageError::Computation {
    stage: ctx.kind.to_string(),
    message: format!("failed to serialize {}: {e}", path.display()),
  })?;
  tokio::fs::write(path, content).await?;
  Ok(())
}
