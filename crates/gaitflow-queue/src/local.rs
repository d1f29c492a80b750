//! In-process task queues.
//!
//! Each named queue is an mpsc channel drained by a fixed number of worker
//! loops. Every task's state lives in a watch channel; the worker holds the
//! sending side and the caller's [`TaskHandle`] the receiving side.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
  ProgressReporter, QueueError, StageHandler, StageRequest, TaskHandle, TaskQueue, TaskState,
};

struct Envelope {
  task_id: String,
  request: StageRequest,
  state: watch::Sender<TaskState>,
}

/// Named in-process queues with a worker pool each.
///
/// # Usage
///
/// ```ignore
/// let cancel = CancellationToken::new();
/// let mut queue = LocalQueue::new(cancel.clone());
/// queue.register("turn_time_task_queue", handler, 2);
///
/// let handle = queue.submit("turn_time_task_queue", request).await?;
/// let value = handle.get(None).await?;
/// ```
pub struct LocalQueue {
  senders: HashMap<String, mpsc::Sender<Envelope>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  cancel: CancellationToken,
  buffer_size: usize,
}

impl LocalQueue {
  pub fn new(cancel: CancellationToken) -> Self {
    Self::with_buffer_size(cancel, 100)
  }

  pub fn with_buffer_size(cancel: CancellationToken, buffer_size: usize) -> Self {
    Self {
      senders: HashMap::new(),
      workers: Mutex::new(Vec::new()),
      cancel,
      buffer_size,
    }
  }

  /// Start `concurrency` workers draining `queue` into `handler`.
  pub fn register(&mut self, queue: &str, handler: Arc<dyn StageHandler>, concurrency: usize) {
    let (sender, receiver) = mpsc::channel(self.buffer_size);
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

    let mut spawned = Vec::with_capacity(concurrency);
    for worker in 0..concurrency.max(1) {
      spawned.push(tokio::spawn(worker_loop(
        queue.to_string(),
        worker,
        receiver.clone(),
        handler.clone(),
        self.cancel.child_token(),
      )));
    }

    self.lock_workers().extend(spawned);
    self.senders.insert(queue.to_string(), sender);
    info!(queue, concurrency, "queue_registered");
  }

  pub fn queues(&self) -> impl Iterator<Item = &str> {
    self.senders.keys().map(String::as_str)
  }

  fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
    match self.workers.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Cancel every worker and wait for them to exit.
  pub async fn shutdown(&self) {
    self.cancel.cancel();
    let workers: Vec<_> = self.lock_workers().drain(..).collect();
    for worker in workers {
      let _ = worker.await;
    }
  }
}

#[async_trait]
impl TaskQueue for LocalQueue {
  async fn submit(&self, queue: &str, request: StageRequest) -> Result<TaskHandle, QueueError> {
    let sender = self
      .senders
      .get(queue)
      .ok_or_else(|| QueueError::UnknownQueue {
        queue: queue.to_string(),
      })?;

    let task_id = uuid::Uuid::new_v4().to_string();
    let (state, receiver) = watch::channel(TaskState::Pending);

    sender
      .send(Envelope {
        task_id: task_id.clone(),
        request,
        state,
      })
      .await
      .map_err(|_| QueueError::Closed {
        queue: queue.to_string(),
      })?;

    Ok(TaskHandle::new(task_id, receiver))
  }
}

async fn worker_loop(
  queue: String,
  worker: usize,
  receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Envelope>>>,
  handler: Arc<dyn StageHandler>,
  cancel: CancellationToken,
) {
  loop {
    // cancellation wins over buffered work
    let next = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        info!(queue = %queue, worker, "worker_cancelled");
        break;
      }
      next = async { receiver.lock().await.recv().await } => next,
    };

    let Some(envelope) = next else {
      info!(queue = %queue, worker, "worker_channel_closed");
      break;
    };

    run_task(&queue, envelope, handler.clone()).await;
  }
}

async fn run_task(queue: &str, envelope: Envelope, handler: Arc<dyn StageHandler>) {
  let Envelope {
    task_id,
    request,
    state,
  } = envelope;

  info!(
    queue,
    task_id = %task_id,
    job_id = %request.job_id,
    stage = %request.stage,
    "task_started"
  );

  let reporter = ProgressReporter::new(task_id.clone(), state.clone());
  reporter.report(0, "started");

  // panics inside a handler surface as a failed task
  let outcome = tokio::spawn(async move { handler.handle(request, reporter).await }).await;

  let final_state = match outcome {
    Ok(Ok(value)) => {
      info!(queue, task_id = %task_id, "task_completed");
      TaskState::Succeeded(value)
    }
    Ok(Err(e)) => {
      error!(queue, task_id = %task_id, error = %e, "task_failed");
      TaskState::Failed(e.to_string())
    }
    Err(join_error) => {
      error!(queue, task_id = %task_id, error = %join_error, "task_panicked");
      TaskState::Failed(format!("task panicked: {join_error}"))
    }
  };
  state.send_replace(final_state);
}
