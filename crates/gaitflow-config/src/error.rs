use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read settings file '{}'", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse settings file '{}'", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid setting '{field}': {message}")]
  Invalid { field: String, message: String },
}

impl ConfigError {
  pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Invalid {
      field: field.into(),
      message: message.into(),
    }
  }
}
