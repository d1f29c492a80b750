//! gaitflow Coordinator
//!
//! Runs a job's pipeline: picks the pipeline for the job's data type and
//! model, submits each stage to its queue, waits, and publishes the clinical
//! parameters.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Coordinator                           │
//! │  - run_job(id): entry guard, status, results                 │
//! │  - sequential steps: poll until ready, failure is fatal      │
//! │  - fork steps: submit together, join all                     │
//! │  - fallbacks: bounded wait, sentinel on timeout              │
//! └──────────────────────────────────────────────────────────────┘
//!                 │ submit                     ▲ TaskHandle
//!                 ▼                            │
//! ┌──────────────────────────────────────────────────────────────┐
//! │             TaskQueue ({stage}_task_queue)                   │
//! └──────────────────────────────────────────────────────────────┘
//!                 │
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │     StageDispatcher: guard ─► fetch ─► execute ─► upload     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod coordinator;
mod error;
mod events;
mod pipeline;
mod results;

pub use coordinator::{Coordinator, JobOutcome, MAX_ERROR_CHARS, truncate};
pub use error::PipelineError;
pub use events::{ChannelNotifier, NoopNotifier, PipelineEvent, PipelineNotifier};
pub use pipeline::{
  Criticality, Fallback, GAIT_2D, GAIT_2D_FOCAL_LENGTH, GAIT_SVO, Pipeline, PipelineRegistry,
  SENTINEL, StageSpec, Step,
};
pub use results::ResultSource;
