use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
  /// The remote path does not exist.
  #[error("remote path not found: {path}")]
  NotFound { path: String },

  /// A folder operation was given a path without a trailing '/'.
  #[error("'{path}' is not a folder path (must end with '/')")]
  NotAFolder { path: String },

  /// The server answered with a status the operation does not accept.
  #[error("{method} '{path}' returned status {status}")]
  UnexpectedStatus {
    method: String,
    path: String,
    status: u16,
  },

  /// The server spoke something other than the expected protocol.
  #[error("protocol error for '{path}': {message}")]
  Protocol { path: String, message: String },

  #[error("invalid remote url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
