//! gaitflow Idempotency Guard
//!
//! Every stage invocation first tries to set a lock keyed by stage and job.
//! The first caller does the work; every later caller sees the lock held and
//! returns immediately. The coordinator's own entry point is guarded the
//! same way.
//!
//! Locks are permanent by default. With a lease configured, an acquired lock
//! expires unless its holder keeps renewing it, which lets a crashed worker's
//! stage be picked up again; a completed stage makes its lock permanent.

mod error;
mod guard;
mod memory;
mod sqlite;

pub use error::LockError;
pub use guard::{GuardOutcome, IdempotencyGuard, LockHandle};
pub use memory::InMemoryLockStore;
pub use sqlite::SqliteLockStore;

use std::time::Duration;

use async_trait::async_trait;

/// Distributed set-if-absent lock storage.
///
/// `owner` identifies one acquisition so that a holder can only renew or
/// release its own lock.
#[async_trait]
pub trait LockStore: Send + Sync {
  /// Atomically take `key` if it is free or its lease has run out.
  async fn set_if_absent(
    &self,
    key: &str,
    owner: &str,
    lease: Option<Duration>,
  ) -> Result<bool, LockError>;

  /// Push the expiry of a leased lock out by `lease`. `false` if the lock is
  /// no longer held by `owner`.
  async fn renew(&self, key: &str, owner: &str, lease: Duration) -> Result<bool, LockError>;

  /// Drop the expiry so the lock is held forever.
  async fn persist(&self, key: &str, owner: &str) -> Result<(), LockError>;

  async fn release(&self, key: &str, owner: &str) -> Result<(), LockError>;

  /// Whether anyone currently holds `key`.
  async fn is_held(&self, key: &str) -> Result<bool, LockError>;
}
