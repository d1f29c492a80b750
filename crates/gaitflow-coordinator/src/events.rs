//! Pipeline events and notifiers for observability.
//!
//! The coordinator emits one event per state transition of a job:
//!
//! ```text
//! JobStarted ─► StageSubmitted ─► StageCompleted | StageDegraded ─► ... ─► JobCompleted
//!                      └────────► StageFailed ─► JobFailed
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a job's pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
  JobStarted {
    job_id: String,
    pipeline: String,
  },

  StageSubmitted {
    job_id: String,
    stage: String,
    task_id: String,
  },

  StageCompleted {
    job_id: String,
    stage: String,
    value: serde_json::Value,
  },

  /// An optional result was replaced by its sentinel.
  StageDegraded {
    job_id: String,
    stage: String,
    reason: String,
    sentinel: f64,
  },

  StageFailed {
    job_id: String,
    stage: String,
    error: String,
  },

  JobCompleted {
    job_id: String,
  },

  JobFailed {
    job_id: String,
    error: String,
  },
}

/// Receives pipeline events.
pub trait PipelineNotifier: Send + Sync {
  fn notify(&self, event: PipelineEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PipelineNotifier for NoopNotifier {
  fn notify(&self, _event: PipelineEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PipelineEvent>) -> Self {
    Self { sender }
  }
}

impl PipelineNotifier for ChannelNotifier {
  fn notify(&self, event: PipelineEvent) {
    // receiver may be gone
    let _ = self.sender.send(event);
  }
}
