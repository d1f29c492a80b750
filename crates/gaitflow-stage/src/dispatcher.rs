use std::sync::Arc;

use async_trait::async_trait;
use gaitflow_lock::{GuardOutcome, IdempotencyGuard};
use gaitflow_queue::{HandlerError, ProgressReporter, StageHandler, StageRequest};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::context::{JobParams, StageContext, StageEnv};
use crate::error::StageError;
use crate::kind::StageKind;
use crate::stage::run_stage;
use crate::stages::build_stage;

/// Queue-side entry point for every stage.
///
/// Resolves the stage from the request, takes the `{stage}_{job}` guard and
/// runs the lifecycle. A request whose guard is already held does no work;
/// it answers with the result recovered from the earlier run's uploaded
/// outputs, or `true` when there is none.
#[derive(Clone)]
pub struct StageDispatcher {
  env: Arc<StageEnv>,
  guard: IdempotencyGuard,
}

impl StageDispatcher {
  pub fn new(env: Arc<StageEnv>, guard: IdempotencyGuard) -> Self {
    Self { env, guard }
  }

  pub fn env(&self) -> &Arc<StageEnv> {
    &self.env
  }

  /// Run one request under the idempotency guard.
  pub async fn dispatch(
    &self,
    request: StageRequest,
    progress: ProgressReporter,
  ) -> Result<Value, StageError> {
    let kind: StageKind = request.stage.parse()?;
    let key = IdempotencyGuard::key(kind.as_str(), &request.job_id);

    let lock = match self.guard.acquire(&key).await? {
      GuardOutcome::AlreadyHeld => return Ok(self.recover(kind, request, progress).await),
      GuardOutcome::Acquired(lock) => lock,
    };

    let params = match parse_params(kind, request.config) {
      Ok(params) => params,
      Err(e) => {
        if let Err(release) = lock.abandon().await {
          warn!(key = %key, error = %release, "lock_release_failed");
        }
        return Err(e);
      }
    };

    let ctx = self.context(kind, request.job_id, params, progress);
    let stage = build_stage(kind);

    match run_stage(stage.as_ref(), &ctx).await {
      Ok(value) => {
        lock.complete().await?;
        Ok(value)
      }
      Err(e) => {
        if let Err(release) = lock.abandon().await {
          warn!(key = %key, error = %release, "lock_release_failed");
        }
        Err(e)
      }
    }
  }

  async fn recover(&self, kind: StageKind, request: StageRequest, progress: ProgressReporter) -> Value {
    let job_id = request.job_id;
    let params = match parse_params(kind, request.config) {
      Ok(params) => params,
      Err(e) => {
        warn!(job_id = %job_id, stage = %kind, error = %e, "stage_skipped");
        return json!(true);
      }
    };

    let ctx = self.context(kind, job_id, params, progress);
    match build_stage(kind).recover(&ctx).await {
      Ok(value) => {
        info!(job_id = %ctx.job_id, stage = %kind, result = %value, "stage_skipped");
        value
      }
      Err(e) => {
        warn!(job_id = %ctx.job_id, stage = %kind, error = %e, "stage_result_unavailable");
        json!(true)
      }
    }
  }

  fn context(
    &self,
    kind: StageKind,
    job_id: String,
    params: JobParams,
    progress: ProgressReporter,
  ) -> StageContext {
    StageContext {
      env: self.env.clone(),
      job_id,
      kind,
      params,
      progress,
    }
  }
}

fn parse_params(kind: StageKind, config: Value) -> Result<JobParams, StageError> {
  serde_json::from_value(config).map_err(|e| StageError::InvalidRequest {
    stage: kind.to_string(),
    message: e.to_string(),
  })
}

#[async_trait]
impl StageHandler for StageDispatcher {
  async fn handle(
    &self,
    request: StageRequest,
    progress: ProgressReporter,
  ) -> Result<Value, HandlerError> {
    Ok(self.dispatch(request, progress).await?)
  }
}
