use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::Stage;
use crate::stages::tool_failed;
use crate::tool::ToolInvocation;

/// A stage that is a single tool call.
///
/// The tool receives the local path of every input, then of every output,
/// in artifact-table order.
#[derive(Debug, Clone)]
pub struct ExternalToolStage {
  kind: StageKind,
  tool: &'static str,
}

impl ExternalToolStage {
  pub fn new(kind: StageKind, tool: &'static str) -> Self {
    Self { kind, tool }
  }
}

#[async_trait]
impl Stage for ExternalToolStage {
  fn kind(&self) -> StageKind {
    self.kind
  }

  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError> {
    ctx.prepare_outputs().await?;

    let invocation = ctx
      .inputs()
      .into_iter()
      .chain(ctx.outputs())
      .fold(ToolInvocation::new(self.tool, ctx.local_dir()), |inv, artifact| {
        inv.path_arg(&ctx.local(&artifact.relative))
      });

    ctx
      .env
      .tools
      .run(&invocation)
      .await
      .map_err(|e| tool_failed(ctx, e))?;
    Ok(json!(true))
  }
}
