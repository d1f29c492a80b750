use std::path::PathBuf;

use gaitflow_gait::GaitError;
use gaitflow_lock::LockError;
use gaitflow_sync::SyncError;
use thiserror::Error;

/// Failures while invoking an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
  #[error("no program configured for tool '{tool}'")]
  NotConfigured { tool: String },

  #[error("failed to start tool '{tool}': {source}")]
  Spawn {
    tool: String,
    #[source]
    source: std::io::Error,
  },

  #[error("tool '{tool}' exited with {status}: {stderr}")]
  Failed {
    tool: String,
    status: String,
    stderr: String,
  },
}

/// Errors raised by a stage; any of them aborts the stage.
#[derive(Debug, Error)]
pub enum StageError {
  #[error("unknown stage '{name}'")]
  UnknownStage { name: String },

  #[error("invalid request for stage '{stage}': {message}")]
  InvalidRequest { stage: String, message: String },

  #[error("stage '{stage}' failed to transfer '{path}': {source}")]
  Transfer {
    stage: String,
    path: String,
    #[source]
    source: SyncError,
  },

  #[error("stage '{stage}' did not produce '{}'", path.display())]
  MissingOutput { stage: String, path: PathBuf },

  #[error("stage '{stage}': {source}")]
  Tool {
    stage: String,
    #[source]
    source: ToolError,
  },

  #[error("stage '{stage}' gave up on tool '{tool}' after {attempts} attempts")]
  RetriesExhausted {
    stage: String,
    tool: String,
    attempts: usize,
  },

  #[error("stage '{stage}' could not read '{}': {message}", path.display())]
  InvalidOutput {
    stage: String,
    path: PathBuf,
    message: String,
  },

  #[error("stage '{stage}': {message}")]
  Computation { stage: String, message: String },

  #[error(transparent)]
  Gait(#[from] GaitError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
