use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}
