use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{LockError, LockStore};

/// SQLite-backed lock store, shared by every process using the same
/// database.
///
/// Expiry is stored as unix milliseconds; `NULL` means the lock never
/// expires.
pub struct SqliteLockStore {
  pool: SqlitePool,
}

impl SqliteLockStore {
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  pub async fn migrate(&self) -> Result<(), LockError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

fn lease_millis(lease: Duration) -> i64 {
  i64::try_from(lease.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl LockStore for SqliteLockStore {
  async fn set_if_absent(
    &self,
    key: &str,
    owner: &str,
    lease: Option<Duration>,
  ) -> Result<bool, LockError> {
    let now = now_millis();
    let expires_at = lease.map(|l| now.saturating_add(lease_millis(l)));

    // the conflict branch only fires when the existing row has expired
    let result = sqlx::query(
      r#"
            INSERT INTO locks (key, owner, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE
            SET owner = excluded.owner,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE locks.expires_at IS NOT NULL AND locks.expires_at <= ?
            "#,
    )
    .bind(key)
    .bind(owner)
    .bind(now)
    .bind(expires_at)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn renew(&self, key: &str, owner: &str, lease: Duration) -> Result<bool, LockError> {
    let now = now_millis();
    let result = sqlx::query(
      r#"
            UPDATE locks
            SET expires_at = ?
            WHERE key = ? AND owner = ? AND expires_at IS NOT NULL AND expires_at > ?
            "#,
    )
    .bind(now.saturating_add(lease_millis(lease)))
    .bind(key)
    .bind(owner)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(result.rows_affected() == 1)
  }

  async fn persist(&self, key: &str, owner: &str) -> Result<(), LockError> {
    sqlx::query("UPDATE locks SET expires_at = NULL WHERE key = ? AND owner = ?")
      .bind(key)
      .bind(owner)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn release(&self, key: &str, owner: &str) -> Result<(), LockError> {
    sqlx::query("DELETE FROM locks WHERE key = ? AND owner = ?")
      .bind(key)
      .bind(owner)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn is_held(&self, key: &str) -> Result<bool, LockError> {
    let held: Option<i64> = sqlx::query_scalar(
      r#"
            SELECT 1 FROM locks
            WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
    )
    .bind(key)
    .bind(now_millis())
    .fetch_optional(&self.pool)
    .await?;

    Ok(held.is_some())
  }
}
