use gaitflow_lock::LockError;
use gaitflow_queue::QueueError;
use gaitflow_store::StoreError;
use thiserror::Error;

/// Errors that stop a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("no pipeline for data type '{data_type}' and model '{model_name}'")]
  UnknownPipeline {
    data_type: String,
    model_name: String,
  },

  #[error("could not submit stage '{stage}': {source}")]
  Submit {
    stage: String,
    #[source]
    source: QueueError,
  },

  #[error("{stage} task failed: {message}")]
  StageFailed { stage: String, message: String },

  #[error("stage '{stage}' returned an unusable result: {message}")]
  InvalidResult { stage: String, message: String },

  #[error("store error: {0}")]
  Store(#[from] StoreError),

  #[error("lock error: {0}")]
  Lock(#[from] LockError),
}
