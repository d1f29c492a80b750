//! The four-phase stage lifecycle.
//!
//! `fetch` mirrors the stage's inputs into its scratch directory, `execute`
//! does the work, `upload` pushes the outputs back and `clear` removes the
//! scratch directory. [`run_stage`] runs them strictly in that order and
//! stops at the first error, leaving the scratch directory in place.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info, instrument};

use crate::context::StageContext;
use crate::error::StageError;
use crate::kind::{ArtifactKind, StageKind};

#[async_trait]
pub trait Stage: Send + Sync {
  fn kind(&self) -> StageKind;

  /// Download every input artifact. Reports 0%.
  async fn fetch(&self, ctx: &StageContext) -> Result<(), StageError> {
    ctx.progress.report(0, "fetching data");
    for artifact in ctx.inputs() {
      let remote = ctx.remote(&artifact.relative);
      let local = ctx.local(&artifact.relative);
      let transfer = match artifact.kind {
        ArtifactKind::File => ctx.env.sync.download(&remote, &local).await,
        ArtifactKind::Folder => ctx.env.sync.download_folder(&remote, &local).await.map(|_| ()),
      };
      transfer.map_err(|source| StageError::Transfer {
        stage: ctx.kind.to_string(),
        path: remote,
        source,
      })?;
    }
    Ok(())
  }

  /// Do the stage's work and return its result value.
  async fn execute(&self, ctx: &StageContext) -> Result<Value, StageError>;

  /// Upload every output artifact. Reports 100%.
  async fn upload(&self, ctx: &StageContext) -> Result<(), StageError> {
    ctx.progress.report(100, "uploading data");
    for artifact in ctx.outputs() {
      let local = ctx.local(&artifact.relative);
      if !tokio::fs::try_exists(&local).await? {
        return Err(StageError::MissingOutput {
          stage: ctx.kind.to_string(),
          path: local,
        });
      }
      let remote = ctx.remote(&artifact.relative);
      let transfer = match artifact.kind {
        ArtifactKind::File => ctx.env.sync.upload(&local, &remote).await,
        ArtifactKind::Folder => ctx.env.sync.upload_folder(&local, &remote).await.map(|_| ()),
      };
      transfer.map_err(|source| StageError::Transfer {
        stage: ctx.kind.to_string(),
        path: remote,
        source,
      })?;
    }
    Ok(())
  }

  /// Result value of an earlier run that already completed for this job,
  /// rebuilt from the outputs it uploaded. Stages whose only products are
  /// artifacts answer `true`.
  async fn recover(&self, _ctx: &StageContext) -> Result<Value, StageError> {
    Ok(json!(true))
  }

  /// Remove the stage's scratch directory.
  async fn clear(&self, ctx: &StageContext) -> Result<(), StageError> {
    match tokio::fs::remove_dir_all(ctx.local_dir()).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

/// Run a stage's four phases in order.
#[instrument(
  name = "stage_run",
  skip(stage, ctx),
  fields(job_id = %ctx.job_id, stage = %ctx.kind)
)]
pub async fn run_stage(stage: &dyn Stage, ctx: &StageContext) -> Result<Value, StageError> {
  info!(trial_id = %ctx.trial(), "stage_started");

  let result = run_phases(stage, ctx).await;

  match &result {
    Ok(value) => info!(result = %value, "stage_completed"),
    Err(e) => error!(error = %e, "stage_failed"),
  }
  result
}

async fn run_phases(stage: &dyn Stage, ctx: &StageContext) -> Result<Value, StageError> {
  stage.fetch(ctx).await?;
  let value = stage.execute(ctx).await?;
  stage.upload(ctx).await?;
  stage.clear(ctx).await?;
  Ok(value)
}
