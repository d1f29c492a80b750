use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{Job, JobResult, JobStatus, JobStore, StageExecution, StoreError};

/// SQLite-based store implementation.
pub struct SqliteJobStore {
  pool: SqlitePool,
}

impl SqliteJobStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to `url` (e.g. `sqlite://gaitflow.db?mode=rwc`).
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    Ok(Self::new(SqlitePool::connect(url).await?))
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl JobStore for SqliteJobStore {
  async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO jobs (job_id, data_type, model_name, trial_id, subject_height, focal_length, status, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&job.job_id)
    .bind(&job.data_type)
    .bind(&job.model_name)
    .bind(&job.trial_id)
    .bind(job.subject_height)
    .bind(job.focal_length)
    .bind(job.status)
    .bind(&job.error)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
    sqlx::query_as(
      r#"
            SELECT job_id, data_type, model_name, trial_id, subject_height, focal_length, status, error, created_at, updated_at
            FROM jobs
            WHERE job_id = ?
            "#,
    )
    .bind(job_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
      job_id: job_id.to_string(),
    })
  }

  async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
    let jobs = sqlx::query_as(
      r#"
            SELECT job_id, data_type, model_name, trial_id, subject_height, focal_length, status, error, created_at, updated_at
            FROM jobs
            ORDER BY created_at DESC
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(jobs)
  }

  async fn update_status(
    &self,
    job_id: &str,
    status: JobStatus,
    error: Option<&str>,
  ) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    let current: JobStatus = sqlx::query_scalar("SELECT status FROM jobs WHERE job_id = ?")
      .bind(job_id)
      .fetch_optional(&mut *tx)
      .await?
      .ok_or_else(|| StoreError::NotFound {
        job_id: job_id.to_string(),
      })?;

    if !current.can_transition_to(status) {
      return Err(StoreError::InvalidTransition {
        job_id: job_id.to_string(),
        from: current,
        to: status,
      });
    }

    sqlx::query(
      r#"
            UPDATE jobs
            SET status = ?, error = ?, updated_at = ?
            WHERE job_id = ?
            "#,
    )
    .bind(status)
    .bind(error)
    .bind(Utc::now())
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn record_stage_execution(&self, execution: &StageExecution) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO stage_executions (job_id, stage, task_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
    )
    .bind(&execution.job_id)
    .bind(&execution.stage)
    .bind(&execution.task_id)
    .bind(execution.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_stage_executions(&self, job_id: &str) -> Result<Vec<StageExecution>, StoreError> {
    let executions = sqlx::query_as(
      r#"
            SELECT job_id, stage, task_id, created_at
            FROM stage_executions
            WHERE job_id = ?
            ORDER BY id ASC
            "#,
    )
    .bind(job_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(executions)
  }

  async fn save_results(&self, job_id: &str, results: &[JobResult]) -> Result<(), StoreError> {
    let mut tx = self.pool.begin().await?;

    for result in results {
      sqlx::query(
        r#"
            INSERT INTO job_results (job_id, key, value, unit, value_type)
            VALUES (?, ?, ?, ?, ?)
            "#,
      )
      .bind(job_id)
      .bind(&result.key)
      .bind(result.value)
      .bind(&result.unit)
      .bind(&result.value_type)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn list_results(&self, job_id: &str) -> Result<Vec<JobResult>, StoreError> {
    let results = sqlx::query_as(
      r#"
            SELECT key, value, unit, value_type
            FROM job_results
            WHERE job_id = ?
            ORDER BY id ASC
            "#,
    )
    .bind(job_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(results)
  }
}
