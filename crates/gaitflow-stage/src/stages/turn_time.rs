use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::Stage;
use crate::stages::{read_json, read_remote_json, tool_failed};
use crate::tool::ToolInvocation;

/// What the turn-time tool writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnTimeOutput {
  /// Seconds spent turning.
  pub turn_time: f64,
  /// Per-frame flag, true while turning.
  pub mask: Vec<bool>,
}

/// Measures how long the subject takes to turn around. The result value is
/// the turn time in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TurnTime;

#[async_trait]
impl Stage for TurnTime {
  fn kind(&self) -> StageKind {
    StageKind::TurnTime
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;
    let trial = ctx.trial();
    let keypoints = ctx.local(&format!("out/3d/{trial}.mp4.npy"));
    let output = ctx.local(&format!("out/{trial}-tt.json"));

    let invocation = ToolInvocation::new("turn_time", ctx.local_dir())
      .path_arg(&keypoints)
      .path_arg(&output);
    ctx
      .env
      .tools
      .run(&invocation)
      .await
      .map_err(|e| tool_failed(ctx, e))?;

    let turn: TurnTimeOutput = read_json(ctx, &output).await?;
    turn_value(ctx, &turn, output)
  }

  async fn recover(&self, ctx: &StageContext) -> Result<Value, StageError> {
    let relative = format!("out/{}-tt.json", ctx.trial());
    let turn: TurnTimeOutput = read_remote_json(ctx, &relative).await?;
    turn_value(ctx, &turn, ctx.remote(&relative).into())
  }
}

fn turn_value(ctx: &StageContext, turn: &TurnTimeOutput, path: PathBuf) -> Result<Value, StageError> {
  if !turn.turn_time.is_finite() || turn.turn_time < 0.0 {
    return Err(StageError::InvalidOutput {
      stage: ctx.kind.to_string(),
      path,
      message: format!("turn time {} is not a duration", turn.turn_time),
    });
  }
  Ok(json!(turn.turn_time))
}
