//! gaitflow settings
//!
//! A single [`Settings`] value is built at startup (from a JSON file, then
//! environment overrides) and shared by reference with every component.

mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::ConfigError;

pub const ENV_SYNC_URL: &str = "GAITFLOW_SYNC_URL";
pub const ENV_SYNC_USER: &str = "GAITFLOW_SYNC_USER";
pub const ENV_SYNC_PASSWORD: &str = "GAITFLOW_SYNC_PASSWORD";
pub const ENV_DATABASE_URL: &str = "GAITFLOW_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub sync: SyncSettings,
  /// Root for per-(stage, job) scratch directories.
  pub scratch_root: PathBuf,
  pub database_url: String,
  pub coordinator: CoordinatorSettings,
  pub lock: LockSettings,
  pub queue: QueueSettings,
  pub gait: GaitSettings,
  /// External tools keyed by logical tool name.
  pub tools: HashMap<String, ToolSettings>,
}

/// Remote artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  /// Base URL of the WebDAV server, or a local directory when `backend` is `fs`.
  pub url: String,
  pub backend: SyncBackend,
  pub user: Option<String>,
  pub password: Option<String>,
  /// Prefix under which every job's artifacts live.
  pub result_root: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncBackend {
  Webdav,
  Fs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
  pub poll_interval_ms: u64,
  /// Bound on result retrieval for stages with a fallback.
  pub result_timeout_ms: u64,
  /// How long to wait for informational stages before substituting the
  /// sentinel.
  pub informational_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
  /// When set, locks expire unless renewed by the running stage.
  pub lease_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
  /// Worker loops per named queue.
  pub concurrency: usize,
  /// Per-queue overrides of `concurrency`.
  pub per_queue: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaitSettings {
  pub frame_rate: f64,
  pub min_depth_mm: f64,
  pub stride_length_adjust: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolSettings {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      url: "http://localhost:8080".to_string(),
      backend: SyncBackend::Webdav,
      user: None,
      password: None,
      result_root: "results".to_string(),
    }
  }
}

impl Default for CoordinatorSettings {
  fn default() -> Self {
    Self {
      poll_interval_ms: 3000,
      result_timeout_ms: 10_000,
      informational_timeout_ms: 600_000,
    }
  }
}

impl Default for QueueSettings {
  fn default() -> Self {
    Self {
      concurrency: 1,
      per_queue: HashMap::new(),
    }
  }
}

impl Default for GaitSettings {
  fn default() -> Self {
    Self {
      frame_rate: 30.0,
      min_depth_mm: 1500.0,
      stride_length_adjust: 1.0,
    }
  }
}

impl Default for Settings {
  fn default() -> Self {
    Self::with_data_dir(Path::new(".gaitflow"))
  }
}

impl Settings {
  /// Defaults rooted at `data_dir` (scratch space and the SQLite file).
  pub fn with_data_dir(data_dir: &Path) -> Self {
    Self {
      sync: SyncSettings::default(),
      scratch_root: data_dir.join("scratch"),
      database_url: format!("sqlite://{}?mode=rwc", data_dir.join("gaitflow.db").display()),
      coordinator: CoordinatorSettings::default(),
      lock: LockSettings::default(),
      queue: QueueSettings::default(),
      gait: GaitSettings::default(),
      tools: HashMap::new(),
    }
  }

  /// Read settings from a JSON file. Missing fields take their defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// File (when given) plus process environment, validated.
  pub fn load(path: Option<&Path>, data_dir: &Path) -> Result<Self, ConfigError> {
    let mut settings = match path {
      Some(path) => Self::from_file(path)?,
      None => Self::with_data_dir(data_dir),
    };
    settings.apply_overrides(|key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
  }

  /// Apply endpoint and secret overrides from `lookup`.
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_SYNC_URL) {
      self.sync.url = url;
    }
    if let Some(user) = lookup(ENV_SYNC_USER) {
      self.sync.user = Some(user);
    }
    if let Some(password) = lookup(ENV_SYNC_PASSWORD) {
      self.sync.password = Some(password);
    }
    if let Some(database_url) = lookup(ENV_DATABASE_URL) {
      self.database_url = database_url;
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.sync.url.is_empty() {
      return Err(ConfigError::invalid("sync.url", "must not be empty"));
    }
    if self.coordinator.poll_interval_ms == 0 {
      return Err(ConfigError::invalid("coordinator.poll_interval_ms", "must be positive"));
    }
    if self.queue.concurrency == 0 || self.queue.per_queue.values().any(|n| *n == 0) {
      return Err(ConfigError::invalid("queue.concurrency", "must be positive"));
    }
    if self.lock.lease_secs.is_some_and(|lease| lease < 3) {
      return Err(ConfigError::invalid(
        "lock.lease_secs",
        "must be at least 3 seconds to leave room for renewal",
      ));
    }
    Ok(())
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.coordinator.poll_interval_ms)
  }

  pub fn result_timeout(&self) -> Duration {
    Duration::from_millis(self.coordinator.result_timeout_ms)
  }

  pub fn informational_timeout(&self) -> Duration {
    Duration::from_millis(self.coordinator.informational_timeout_ms)
  }

  pub fn lock_lease(&self) -> Option<Duration> {
    self.lock.lease_secs.map(Duration::from_secs)
  }

  pub fn concurrency_for(&self, queue: &str) -> usize {
    self
      .queue
      .per_queue
      .get(queue)
      .copied()
      .unwrap_or(self.queue.concurrency)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.poll_interval(), Duration::from_secs(3));
    assert_eq!(settings.result_timeout(), Duration::from_secs(10));
    assert_eq!(settings.lock_lease(), None);
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gaitflow.json");
    std::fs::write(
      &path,
      r#"{
        "sync": { "url": "http://dav:9000", "result_root": "gait" },
        "lock": { "lease_secs": 30 },
        "tools": { "turn_time": { "program": "/usr/bin/tt", "args": ["--fast"] } }
      }"#,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert_eq!(settings.sync.url, "http://dav:9000");
    assert_eq!(settings.sync.result_root, "gait");
    assert_eq!(settings.sync.backend, SyncBackend::Webdav);
    assert_eq!(settings.lock_lease(), Some(Duration::from_secs(30)));
    assert_eq!(settings.coordinator.poll_interval_ms, 3000);
    assert_eq!(settings.tools["turn_time"].args, vec!["--fast"]);
  }

  #[test]
  fn test_environment_overrides() {
    let mut settings = Settings::default();
    settings.apply_overrides(|key| match key {
      ENV_SYNC_URL => Some("http://override".to_string()),
      ENV_SYNC_PASSWORD => Some("secret".to_string()),
      ENV_DATABASE_URL => Some("sqlite::memory:".to_string()),
      _ => None,
    });

    assert_eq!(settings.sync.url, "http://override");
    assert_eq!(settings.sync.user, None);
    assert_eq!(settings.sync.password.as_deref(), Some("secret"));
    assert_eq!(settings.database_url, "sqlite::memory:");
  }

  #[test]
  fn test_invalid_values_rejected() {
    let mut settings = Settings::default();
    settings.lock.lease_secs = Some(1);
    assert!(matches!(
      settings.validate(),
      Err(ConfigError::Invalid { ref field, .. }) if field == "lock.lease_secs"
    ));

    let mut settings = Settings::default();
    settings.queue.per_queue.insert("openpose_task_queue".into(), 0);
    assert!(settings.validate().is_err());
  }

  #[test]
  fn test_per_queue_concurrency() {
    let mut settings = Settings::default();
    settings.queue.concurrency = 2;
    settings.queue.per_queue.insert("openpose_task_queue".into(), 4);
    assert_eq!(settings.concurrency_for("openpose_task_queue"), 4);
    assert_eq!(settings.concurrency_for("turn_time_task_queue"), 2);
  }

  #[test]
  fn test_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
      Settings::from_file(&path),
      Err(ConfigError::Parse { .. })
    ));
    assert!(matches!(
      Settings::from_file(&dir.path().join("missing.json")),
      Err(ConfigError::Read { .. })
    ));
  }
}
