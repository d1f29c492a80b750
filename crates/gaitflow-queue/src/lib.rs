//! gaitflow Queue
//!
//! The task-submission contract between the coordinator and stage workers:
//! enqueue a [`StageRequest`] on a named queue, get back a [`TaskHandle`]
//! that reports readiness, failure, progress and, eventually, the stage's
//! JSON result.
//!
//! [`LocalQueue`] runs everything in-process on tokio tasks.

mod error;
mod handle;
mod local;

pub use error::{HandleError, QueueError};
pub use handle::{Progress, ProgressReporter, TaskHandle, TaskState};
pub use local::LocalQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One unit of stage work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRequest {
  pub job_id: String,
  pub stage: String,
  /// Job-level parameters the stage may need (trial id, focal length, ...).
  #[serde(default)]
  pub config: serde_json::Value,
}

/// Runs requests taken off a queue.
#[async_trait]
pub trait StageHandler: Send + Sync {
  async fn handle(
    &self,
    request: StageRequest,
    progress: ProgressReporter,
  ) -> Result<serde_json::Value, HandlerError>;
}

/// Submits requests to named queues.
#[async_trait]
pub trait TaskQueue: Send + Sync {
  async fn submit(&self, queue: &str, request: StageRequest) -> Result<TaskHandle, QueueError>;
}

/// Conventional queue name for a stage.
pub fn queue_name(stage: &str) -> String {
  format!("{stage}_task_queue")
}
