use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{LockError, LockStore};

/// Result of trying to acquire a guard key.
#[derive(Debug)]
pub enum GuardOutcome {
  /// This caller owns the key and should do the work.
  Acquired(LockHandle),
  /// Someone already did, or is doing, the work.
  AlreadyHeld,
}

/// Test-and-set wrapper around a [`LockStore`].
#[derive(Clone)]
pub struct IdempotencyGuard {
  store: Arc<dyn LockStore>,
  lease: Option<Duration>,
}

impl IdempotencyGuard {
  pub fn new(store: Arc<dyn LockStore>) -> Self {
    Self { store, lease: None }
  }

  /// Acquired locks expire after `lease` unless renewed; the handle renews
  /// them every third of the lease.
  pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
    self.lease = lease;
    self
  }

  /// Lock key for one stage of one job.
  pub fn key(stage: &str, job_id: &str) -> String {
    format!("{stage}_{job_id}")
  }

  /// Lock key for the coordinator entry point of a job.
  pub fn entry_key(job_id: &str) -> String {
    Self::key("entry_task", job_id)
  }

  pub async fn acquire(&self, key: &str) -> Result<GuardOutcome, LockError> {
    let owner = uuid::Uuid::new_v4().to_string();
    if !self.store.set_if_absent(key, &owner, self.lease).await? {
      info!(key, "lock_already_held");
      return Ok(GuardOutcome::AlreadyHeld);
    }
    debug!(key, "lock_acquired");

    let heartbeat = self.lease.map(|lease| {
      let cancel = CancellationToken::new();
      let task = tokio::spawn(heartbeat(
        self.store.clone(),
        key.to_string(),
        owner.clone(),
        lease,
        cancel.clone(),
      ));
      (cancel, task)
    });

    Ok(GuardOutcome::Acquired(LockHandle {
      key: key.to_string(),
      owner,
      store: self.store.clone(),
      leased: self.lease.is_some(),
      heartbeat,
    }))
  }
}

async fn heartbeat(
  store: Arc<dyn LockStore>,
  key: String,
  owner: String,
  lease: Duration,
  cancel: CancellationToken,
) {
  let period = lease / 3;
  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(period) => {
        match store.renew(&key, &owner, lease).await {
          Ok(true) => {}
          Ok(false) => {
            warn!(key = %key, "lock_lost");
            break;
          }
          Err(e) => warn!(key = %key, error = %e, "lock_renew_failed"),
        }
      }
    }
  }
}

/// An acquired guard key.
///
/// Dropping the handle stops the heartbeat; a leased lock then lapses on its
/// own.
pub struct LockHandle {
  key: String,
  owner: String,
  store: Arc<dyn LockStore>,
  leased: bool,
  heartbeat: Option<(CancellationToken, JoinHandle<()>)>,
}

impl std::fmt::Debug for LockHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LockHandle")
      .field("key", &self.key)
      .field("owner", &self.owner)
      .field("leased", &self.leased)
      .finish()
  }
}

impl LockHandle {
  pub fn key(&self) -> &str {
    &self.key
  }

  async fn stop_heartbeat(&mut self) {
    if let Some((cancel, task)) = self.heartbeat.take() {
      cancel.cancel();
      let _ = task.await;
    }
  }

  /// The guarded work finished; the key stays held for good.
  pub async fn complete(mut self) -> Result<(), LockError> {
    self.stop_heartbeat().await;
    if self.leased {
      self.store.persist(&self.key, &self.owner).await?;
    }
    Ok(())
  }

  /// The guarded work failed.
  ///
  /// A leased key is released so the work can be retried; a permanent key
  /// stays held and later attempts remain no-ops.
  pub async fn abandon(mut self) -> Result<(), LockError> {
    self.stop_heartbeat().await;
    if self.leased {
      self.store.release(&self.key, &self.owner).await?;
    }
    Ok(())
  }
}

impl Drop for LockHandle {
  fn drop(&mut self) {
    if let Some((cancel, _)) = &self.heartbeat {
      cancel.cancel();
    }
  }
}
