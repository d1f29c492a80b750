use std::time::Duration;

use thiserror::Error;

/// Errors from submitting work.
#[derive(Debug, Error, PartialEq)]
pub enum QueueError {
  #[error("no workers registered for queue '{queue}'")]
  UnknownQueue { queue: String },

  #[error("queue '{queue}' is closed")]
  Closed { queue: String },
}

/// Errors from waiting on a submitted task.
#[derive(Debug, Error, PartialEq)]
pub enum HandleError {
  #[error("task '{task_id}' not ready after {after:?}")]
  Timeout { task_id: String, after: Duration },

  #[error("task '{task_id}' failed: {message}")]
  Failed { task_id: String, message: String },

  /// The worker went away before finishing the task.
  #[error("task '{task_id}' was dropped before completing")]
  Dropped { task_id: String },
}
