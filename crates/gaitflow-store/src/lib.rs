//! gaitflow Store
//!
//! Relational persistence for the coordinator:
//! - jobs and their monotonic status
//! - one audit row per submitted stage
//! - published result rows once a job is done
//!
//! [`SqliteJobStore`] is the only backend; migrations live in the workspace
//! `migrations/` directory.

mod sqlite;
mod types;

pub use sqlite::SqliteJobStore;
pub use types::{DEFAULT_FOCAL_LENGTH, Job, JobResult, JobStatus, StageExecution};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("job not found: {job_id}")]
  NotFound { job_id: String },

  /// A status change that would move a job backwards.
  #[error("job '{job_id}' cannot move from {from} to {to}")]
  InvalidTransition {
    job_id: String,
    from: JobStatus,
    to: JobStatus,
  },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage for jobs, stage executions and results.
#[async_trait]
pub trait JobStore: Send + Sync {
  async fn create_job(&self, job: &Job) -> Result<(), StoreError>;

  async fn get_job(&self, job_id: &str) -> Result<Job, StoreError>;

  /// Newest first.
  async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

  /// Move a job forward. `error` is stored alongside the new status.
  async fn update_status(
    &self,
    job_id: &str,
    status: JobStatus,
    error: Option<&str>,
  ) -> Result<(), StoreError>;

  async fn record_stage_execution(&self, execution: &StageExecution) -> Result<(), StoreError>;

  /// In submission order.
  async fn list_stage_executions(&self, job_id: &str) -> Result<Vec<StageExecution>, StoreError>;

  async fn save_results(&self, job_id: &str, results: &[JobResult]) -> Result<(), StoreError>;

  async fn list_results(&self, job_id: &str) -> Result<Vec<JobResult>, StoreError>;
}
