use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gaitflow_lock::{GuardOutcome, IdempotencyGuard};
use gaitflow_queue::{HandleError, StageRequest, TaskHandle, TaskQueue};
use gaitflow_stage::StageKind;
use gaitflow_store::{Job, JobResult, JobStatus, JobStore, StageExecution};
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::error::PipelineError;
use crate::events::{NoopNotifier, PipelineEvent, PipelineNotifier};
use crate::pipeline::{Criticality, Fallback, Pipeline, PipelineRegistry, StageSpec, Step};

/// Longest error message stored on a failed job.
pub const MAX_ERROR_CHARS: usize = 75;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How a call to [`Coordinator::run_job`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
  Completed(Vec<JobResult>),
  /// The job was marked `error` with this (truncated) message.
  Failed(String),
  /// Another coordinator already owns this job.
  Skipped,
}

/// Drives one job through its pipeline.
///
/// # Usage
///
/// ```ignore
/// let coordinator = Coordinator::new(queue, store, guard, registry)
///   .with_poll_interval(settings.poll_interval())
///   .with_notifier(Arc::new(ChannelNotifier::new(tx)));
///
/// match coordinator.run_job(&job_id).await? {
///   JobOutcome::Completed(results) => { /* ... */ }
///   JobOutcome::Failed(message) => { /* ... */ }
///   JobOutcome::Skipped => {}
/// }
/// ```
pub struct Coordinator {
  queue: Arc<dyn TaskQueue>,
  store: Arc<dyn JobStore>,
  guard: IdempotencyGuard,
  registry: PipelineRegistry,
  notifier: Arc<dyn PipelineNotifier>,
  poll_interval: Duration,
}

impl Coordinator {
  pub fn new(
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn JobStore>,
    guard: IdempotencyGuard,
    registry: PipelineRegistry,
  ) -> Self {
    Self {
      queue,
      store,
      guard,
      registry,
      notifier: Arc::new(NoopNotifier),
      poll_interval: DEFAULT_POLL_INTERVAL,
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn PipelineNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  pub fn registry(&self) -> &PipelineRegistry {
    &self.registry
  }

  /// Run a stored job to a terminal status.
  ///
  /// Pipeline failures are recorded on the job and reported as
  /// [`JobOutcome::Failed`]; only store and lock failures are returned as
  /// errors.
  #[instrument(name = "job_run", skip(self))]
  pub async fn run_job(&self, job_id: &str) -> Result<JobOutcome, PipelineError> {
    let lock = match self.guard.acquire(&IdempotencyGuard::entry_key(job_id)).await? {
      GuardOutcome::Acquired(lock) => lock,
      GuardOutcome::AlreadyHeld => {
        info!("job_skipped");
        return Ok(JobOutcome::Skipped);
      }
    };

    let job = match self.start(job_id).await {
      Ok(job) => job,
      Err(e) => {
        if let Err(release) = lock.abandon().await {
          warn!(error = %release, "lock_release_failed");
        }
        return Err(e);
      }
    };

    let outcome = match self.run_pipeline(&job).await {
      Ok(results) => match self.finish(job_id, &results).await {
        Ok(()) => Ok(JobOutcome::Completed(results)),
        Err(e) => self.fail(job_id, e).await,
      },
      Err(e) => self.fail(job_id, e).await,
    };

    match outcome {
      Ok(outcome) => {
        lock.complete().await?;
        Ok(outcome)
      }
      Err(e) => {
        if let Err(release) = lock.abandon().await {
          warn!(error = %release, "lock_release_failed");
        }
        Err(e)
      }
    }
  }

  async fn finish(&self, job_id: &str, results: &[JobResult]) -> Result<(), PipelineError> {
    self.store.save_results(job_id, results).await?;
    self
      .store
      .update_status(job_id, JobStatus::Done, None)
      .await?;
    info!(results = results.len(), "job_completed");
    self.notifier.notify(PipelineEvent::JobCompleted {
      job_id: job_id.to_string(),
    });
    Ok(())
  }

  /// Record `error` on the job. Only a failure to record it is returned.
  async fn fail(&self, job_id: &str, error: PipelineError) -> Result<JobOutcome, PipelineError> {
    let message = truncate(&error.to_string(), MAX_ERROR_CHARS);
    error!(error = %error, "job_failed");
    self
      .store
      .update_status(job_id, JobStatus::Error, Some(&message))
      .await?;
    self.notifier.notify(PipelineEvent::JobFailed {
      job_id: job_id.to_string(),
      error: error.to_string(),
    });
    Ok(JobOutcome::Failed(message))
  }

  async fn start(&self, job_id: &str) -> Result<Job, PipelineError> {
    let job = self.store.get_job(job_id).await?;
    self
      .store
      .update_status(job_id, JobStatus::Computing, None)
      .await?;
    Ok(job)
  }

  /// Run every step of the job's pipeline and map the results.
  pub async fn run_pipeline(&self, job: &Job) -> Result<Vec<JobResult>, PipelineError> {
    let pipeline = self
      .registry
      .get(&job.data_type, &job.model_name)
      .ok_or_else(|| PipelineError::UnknownPipeline {
        data_type: job.data_type.clone(),
        model_name: job.model_name.clone(),
      })?;

    info!(job_id = %job.job_id, pipeline = %pipeline.name, "pipeline_started");
    self.notifier.notify(PipelineEvent::JobStarted {
      job_id: job.job_id.clone(),
      pipeline: pipeline.name.clone(),
    });

    let config = stage_config(job, pipeline);
    let mut outputs: HashMap<StageKind, Value> = HashMap::new();

    for step in &pipeline.steps {
      match step {
        Step::Sequential(spec) => {
          let value = self.run_stage(job, spec, &config).await?;
          outputs.insert(spec.kind, value);
        }
        Step::Fork(specs) => {
          let runs = specs.iter().map(|spec| self.run_stage(job, spec, &config));
          let joined = futures::future::join_all(runs).await;
          for (spec, result) in specs.iter().zip(joined) {
            outputs.insert(spec.kind, result?);
          }
        }
      }
    }

    pipeline.results.publish(&outputs)
  }

  #[instrument(
    name = "stage_await",
    skip(self, job, spec, config),
    fields(job_id = %job.job_id, stage = %spec.kind)
  )]
  async fn run_stage(
    &self,
    job: &Job,
    spec: &StageSpec,
    config: &Value,
  ) -> Result<Value, PipelineError> {
    let stage = spec.kind.to_string();
    let request = StageRequest {
      job_id: job.job_id.clone(),
      stage: stage.clone(),
      config: config.clone(),
    };
    let handle = self
      .queue
      .submit(&spec.kind.queue(), request)
      .await
      .map_err(|source| PipelineError::Submit {
        stage: stage.clone(),
        source,
      })?;

    self
      .store
      .record_stage_execution(&StageExecution {
        job_id: job.job_id.clone(),
        stage: stage.clone(),
        task_id: handle.id().to_string(),
        created_at: Utc::now(),
      })
      .await?;
    info!(task_id = %handle.id(), "stage_submitted");
    self.notifier.notify(PipelineEvent::StageSubmitted {
      job_id: job.job_id.clone(),
      stage: stage.clone(),
      task_id: handle.id().to_string(),
    });

    let value = match spec.criticality {
      Criticality::Required { fallback } => self.await_required(job, &stage, &handle, fallback).await?,
      Criticality::Informational(fallback) => match handle.get(Some(fallback.timeout)).await {
        Ok(value) => value,
        Err(e) => self.degrade(job, &stage, &e, fallback),
      },
    };

    info!(result = %value, "stage_result");
    self.notifier.notify(PipelineEvent::StageCompleted {
      job_id: job.job_id.clone(),
      stage,
      value: value.clone(),
    });
    Ok(value)
  }

  async fn await_required(
    &self,
    job: &Job,
    stage: &str,
    handle: &TaskHandle,
    fallback: Option<Fallback>,
  ) -> Result<Value, PipelineError> {
    while !handle.is_ready() && !handle.is_dropped() {
      tokio::time::sleep(self.poll_interval).await;
    }

    if handle.is_failed() || handle.is_dropped() {
      let message = match handle.get(None).await {
        Err(HandleError::Failed { message, .. }) => message,
        Err(other) => other.to_string(),
        Ok(_) => "task reported failure".to_string(),
      };
      error!(error = %message, "stage_failed");
      self.notifier.notify(PipelineEvent::StageFailed {
        job_id: job.job_id.clone(),
        stage: stage.to_string(),
        error: message.clone(),
      });
      return Err(PipelineError::StageFailed {
        stage: stage.to_string(),
        message,
      });
    }

    match fallback {
      None => handle
        .get(None)
        .await
        .map_err(|e| PipelineError::StageFailed {
          stage: stage.to_string(),
          message: e.to_string(),
        }),
      Some(fallback) => match handle.get(Some(fallback.timeout)).await {
        Ok(value) => Ok(value),
        Err(e) => Ok(self.degrade(job, stage, &e, fallback)),
      },
    }
  }

  fn degrade(&self, job: &Job, stage: &str, reason: &HandleError, fallback: Fallback) -> Value {
    warn!(reason = %reason, sentinel = fallback.sentinel, "stage_degraded");
    self.notifier.notify(PipelineEvent::StageDegraded {
      job_id: job.job_id.clone(),
      stage: stage.to_string(),
      reason: reason.to_string(),
      sentinel: fallback.sentinel,
    });
    json!(fallback.sentinel)
  }
}

fn stage_config(job: &Job, pipeline: &Pipeline) -> Value {
  json!({
    "trial_id": job.trial_id,
    "subject_height": job.subject_height,
    "focal_length": pipeline.focal_length.unwrap_or(job.focal_length),
  })
}

/// First `max_chars` characters of `message`.
pub fn truncate(message: &str, max_chars: usize) -> String {
  message.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_counts_characters() {
    assert_eq!(truncate("short", 75), "short");
    let long = "é".repeat(100);
    assert_eq!(truncate(&long, 75).chars().count(), 75);
  }

  #[test]
  fn test_stage_config_prefers_pipeline_focal_length() {
    let mut job = Job::new("gait_mp4", "gait_2d::v1", "walk");
    job.focal_length = 900.0;
    job.subject_height = 172.0;

    let registry = PipelineRegistry::gait(Duration::from_secs(10), Duration::from_secs(600));
    let config = stage_config(&job, registry.get("gait_mp4", "gait_2d::v1").unwrap());
    assert_eq!(
      config,
      json!({ "trial_id": "walk", "subject_height": 172.0, "focal_length": 1392.0 })
    );

    let config = stage_config(&job, registry.get("gait_svo_and_txt", "gait_svo::v1").unwrap());
    assert_eq!(config["focal_length"], json!(900.0));
  }
}
