use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::HandleError;

/// A progress update reported by a running stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  /// 0 to 100.
  pub percent: u8,
  pub label: String,
}

/// Observable state of one submitted task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
  Pending,
  Running(Progress),
  Succeeded(serde_json::Value),
  Failed(String),
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskState::Succeeded(_) | TaskState::Failed(_))
  }
}

/// Caller-side view of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
  id: String,
  state: watch::Receiver<TaskState>,
}

impl TaskHandle {
  pub(crate) fn new(id: String, state: watch::Receiver<TaskState>) -> Self {
    Self { id, state }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn state(&self) -> TaskState {
    self.state.borrow().clone()
  }

  /// Finished, successfully or not.
  pub fn is_ready(&self) -> bool {
    self.state.borrow().is_terminal()
  }

  pub fn is_failed(&self) -> bool {
    matches!(*self.state.borrow(), TaskState::Failed(_))
  }

  /// The worker side went away without a final state; the task will never
  /// become ready.
  pub fn is_dropped(&self) -> bool {
    self.state.has_changed().is_err() && !self.state.borrow().is_terminal()
  }

  /// Latest progress while running; 100% once succeeded.
  pub fn progress(&self) -> Option<Progress> {
    match &*self.state.borrow() {
      TaskState::Running(progress) => Some(progress.clone()),
      TaskState::Succeeded(_) => Some(Progress {
        percent: 100,
        label: "done".to_string(),
      }),
      _ => None,
    }
  }

  /// Wait for the result, up to `timeout` when given.
  pub async fn get(&self, timeout: Option<Duration>) -> Result<serde_json::Value, HandleError> {
    let mut state = self.state.clone();
    let wait = async {
      state
        .wait_for(TaskState::is_terminal)
        .await
        .map(|s| s.clone())
        .map_err(|_| HandleError::Dropped {
          task_id: self.id.clone(),
        })
    };

    let finished = match timeout {
      Some(after) => tokio::time::timeout(after, wait)
        .await
        .map_err(|_| HandleError::Timeout {
          task_id: self.id.clone(),
          after,
        })??,
      None => wait.await?,
    };

    match finished {
      TaskState::Succeeded(value) => Ok(value),
      TaskState::Failed(message) => Err(HandleError::Failed {
        task_id: self.id.clone(),
        message,
      }),
      _ => Err(HandleError::Dropped {
        task_id: self.id.clone(),
      }),
    }
  }
}

/// Worker-side progress channel for one task.
///
/// Updates never go backwards: a percentage lower than one already reported
/// is ignored.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
  task_id: String,
  state: watch::Sender<TaskState>,
}

impl ProgressReporter {
  pub(crate) fn new(task_id: String, state: watch::Sender<TaskState>) -> Self {
    Self { task_id, state }
  }

  /// A reporter connected to nothing, for running stages outside a queue.
  pub fn detached() -> Self {
    let (state, _) = watch::channel(TaskState::Pending);
    Self {
      task_id: String::new(),
      state,
    }
  }

  pub fn report(&self, percent: u8, label: impl Into<String>) {
    let percent = percent.min(100);
    let label = label.into();
    let accepted = self.state.send_if_modified(|state| {
      let allowed = match state {
        TaskState::Pending => true,
        TaskState::Running(current) => percent >= current.percent,
        _ => false,
      };
      if allowed {
        *state = TaskState::Running(Progress {
          percent,
          label: label.clone(),
        });
      }
      allowed
    });
    if accepted {
      info!(task_id = %self.task_id, percent, label = %label, "task_progress");
    }
  }

  pub fn current(&self) -> Option<Progress> {
    match &*self.state.borrow() {
      TaskState::Running(progress) => Some(progress.clone()),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pair() -> (ProgressReporter, TaskHandle) {
    let (tx, rx) = watch::channel(TaskState::Pending);
    (
      ProgressReporter::new("t".into(), tx),
      TaskHandle::new("t".into(), rx),
    )
  }

  #[test]
  fn test_progress_is_monotonic() {
    let (reporter, handle) = pair();
    assert_eq!(handle.progress(), None);

    reporter.report(0, "fetching data");
    reporter.report(100, "uploading data");
    reporter.report(40, "late update");

    let progress = handle.progress().unwrap();
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.label, "uploading data");
  }

  #[test]
  fn test_progress_clamped() {
    let (reporter, handle) = pair();
    reporter.report(250, "overshoot");
    assert_eq!(handle.progress().unwrap().percent, 100);
  }

  #[tokio::test]
  async fn test_get_timeout_and_success() {
    let (tx, rx) = watch::channel(TaskState::Pending);
    let handle = TaskHandle::new("t".into(), rx);

    let err = handle.get(Some(Duration::from_millis(10))).await.unwrap_err();
    assert!(matches!(err, HandleError::Timeout { .. }));
    assert!(!handle.is_ready());

    tx.send_replace(TaskState::Succeeded(serde_json::json!(3.5)));
    drop(tx);
    assert!(handle.is_ready());
    assert!(!handle.is_dropped());
    assert!(!handle.is_failed());
    assert_eq!(handle.get(None).await.unwrap(), serde_json::json!(3.5));
  }

  #[tokio::test]
  async fn test_get_failed_and_dropped() {
    let (tx, rx) = watch::channel(TaskState::Pending);
    let handle = TaskHandle::new("t".into(), rx);
    tx.send_replace(TaskState::Failed("boom".into()));
    assert!(handle.is_failed());
    assert_eq!(
      handle.get(None).await,
      Err(HandleError::Failed {
        task_id: "t".into(),
        message: "boom".into()
      })
    );

    let (tx, rx) = watch::channel(TaskState::Pending);
    let handle = TaskHandle::new("u".into(), rx);
    assert!(!handle.is_dropped());
    drop(tx);
    assert!(handle.is_dropped());
    assert!(!handle.is_ready());
    assert_eq!(
      handle.get(None).await,
      Err(HandleError::Dropped { task_id: "u".into() })
    );
  }
}
