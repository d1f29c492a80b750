use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{LockError, LockStore};

#[derive(Debug)]
struct Entry {
  owner: String,
  expires_at: Option<Instant>,
}

impl Entry {
  fn live(&self, now: Instant) -> bool {
    self.expires_at.is_none_or(|at| at > now)
  }
}

/// In-memory lock store.
///
/// Suitable for a single process or for testing.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
  entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLockStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
    let mut entries = match self.entries.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut entries)
  }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
  async fn set_if_absent(
    &self,
    key: &str,
    owner: &str,
    lease: Option<Duration>,
  ) -> Result<bool, LockError> {
    let now = Instant::now();
    Ok(self.with_entries(|entries| {
      if entries.get(key).is_some_and(|e| e.live(now)) {
        return false;
      }
      entries.insert(
        key.to_string(),
        Entry {
          owner: owner.to_string(),
          expires_at: lease.map(|l| now + l),
        },
      );
      true
    }))
  }

  async fn renew(&self, key: &str, owner: &str, lease: Duration) -> Result<bool, LockError> {
    let now = Instant::now();
    Ok(self.with_entries(|entries| match entries.get_mut(key) {
      Some(entry) if entry.owner == owner && entry.live(now) => {
        if entry.expires_at.is_some() {
          entry.expires_at = Some(now + lease);
        }
        true
      }
      _ => false,
    }))
  }

  async fn persist(&self, key: &str, owner: &str) -> Result<(), LockError> {
    self.with_entries(|entries| {
      if let Some(entry) = entries.get_mut(key).filter(|e| e.owner == owner) {
        entry.expires_at = None;
      }
    });
    Ok(())
  }

  async fn release(&self, key: &str, owner: &str) -> Result<(), LockError> {
    self.with_entries(|entries| {
      if entries.get(key).is_some_and(|e| e.owner == owner) {
        entries.remove(key);
      }
    });
    Ok(())
  }

  async fn is_held(&self, key: &str) -> Result<bool, LockError> {
    let now = Instant::now();
    Ok(self.with_entries(|entries| entries.get(key).is_some_and(|e| e.live(now))))
  }
}
