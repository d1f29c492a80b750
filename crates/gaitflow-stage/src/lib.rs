//! gaitflow Stage
//!
//! A stage is one step of a gait pipeline. Every stage follows the same
//! lifecycle:
//!
//! ```text
//! fetch (0%) ──► execute ──► upload (100%) ──► clear
//! ```
//!
//! Inputs and outputs are declared per [`StageKind`] and mirrored between the
//! remote store and a private scratch directory `{scratch}/{stage}/{job}`.
//! External programs are reached only through [`ToolRunner`].
//!
//! [`StageDispatcher`] plugs the stages into a task queue and applies the
//! idempotency guard, so a stage runs at most once per job.

mod context;
mod dispatcher;
mod error;
mod kind;
mod stage;
pub mod stages;
mod timestamps;
mod tool;

pub use context::{JobParams, StageContext, StageEnv};
pub use dispatcher::StageDispatcher;
pub use error::{StageError, ToolError};
pub use kind::{Artifact, ArtifactKind, StageKind};
pub use stage::{Stage, run_stage};
pub use stages::build_stage;
pub use timestamps::{TimestampRepair, ensure_trailing_newline, repair_timestamp_file};
pub use tool::{ProcessToolRunner, ToolInvocation, ToolRunner, run_until_exists};
