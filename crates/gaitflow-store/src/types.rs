use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Camera focal length (pixels) assumed when a submission does not give one.
pub const DEFAULT_FOCAL_LENGTH: f64 = 1392.0;

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
  Queued,
  Computing,
  Done,
  Error,
}

impl JobStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, JobStatus::Done | JobStatus::Error)
  }

  pub fn can_transition_to(self, next: JobStatus) -> bool {
    matches!(
      (self, next),
      (JobStatus::Queued, JobStatus::Computing)
        | (JobStatus::Queued, JobStatus::Error)
        | (JobStatus::Computing, JobStatus::Done)
        | (JobStatus::Computing, JobStatus::Error)
    )
  }
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      JobStatus::Queued => "queued",
      JobStatus::Computing => "computing",
      JobStatus::Done => "done",
      JobStatus::Error => "error",
    };
    f.write_str(s)
  }
}

/// One submitted trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
  pub job_id: String,
  pub data_type: String,
  pub model_name: String,
  pub trial_id: String,
  /// Subject height in cm, 0 when unknown.
  pub subject_height: f64,
  pub focal_length: f64,
  pub status: JobStatus,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Job {
  /// A fresh queued job with a random id.
  pub fn new(
    data_type: impl Into<String>,
    model_name: impl Into<String>,
    trial_id: impl Into<String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      job_id: uuid::Uuid::new_v4().to_string(),
      data_type: data_type.into(),
      model_name: model_name.into(),
      trial_id: trial_id.into(),
      subject_height: 0.0,
      focal_length: DEFAULT_FOCAL_LENGTH,
      status: JobStatus::Queued,
      error: None,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Audit record of one stage submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StageExecution {
  pub job_id: String,
  pub stage: String,
  /// Id of the task handle returned by the queue.
  pub task_id: String,
  pub created_at: DateTime<Utc>,
}

/// One published clinical parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobResult {
  pub key: String,
  pub value: f64,
  pub unit: String,
  pub value_type: String,
}

impl JobResult {
  pub fn float(key: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value,
      unit: unit.into(),
      value_type: "float".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_only_moves_forward() {
    use JobStatus::*;
    assert!(Queued.can_transition_to(Computing));
    assert!(Computing.can_transition_to(Done));
    assert!(Computing.can_transition_to(Error));
    assert!(Queued.can_transition_to(Error));

    assert!(!Computing.can_transition_to(Queued));
    assert!(!Computing.can_transition_to(Computing));
    assert!(!Done.can_transition_to(Error));
    assert!(!Error.can_transition_to(Done));
    assert!(!Queued.can_transition_to(Done));
    assert!(Done.is_terminal() && Error.is_terminal());
  }

  #[test]
  fn test_new_job_defaults() {
    let job = Job::new("gait_mp4", "gait_2d::v1", "trial-7");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.focal_length, DEFAULT_FOCAL_LENGTH);
    assert_eq!(job.job_id.len(), 36);
  }
}
