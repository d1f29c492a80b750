use std::path::PathBuf;
use std::sync::Arc;

use gaitflow_config::Settings;
use gaitflow_gait::{ExtractorConfig, RatioBand};
use gaitflow_queue::ProgressReporter;
use gaitflow_sync::DataSynchronizer;
use serde::{Deserialize, Serialize};

use crate::kind::{Artifact, StageKind};
use crate::tool::ToolRunner;

/// Process-wide resources shared by every stage run.
#[derive(Clone)]
pub struct StageEnv {
  pub sync: DataSynchronizer,
  pub tools: Arc<dyn ToolRunner>,
  pub scratch_root: PathBuf,
  /// Remote folder holding one subfolder per job.
  pub result_root: String,
  pub extractor: ExtractorConfig,
}

impl StageEnv {
  pub fn new(settings: &Settings, sync: DataSynchronizer, tools: Arc<dyn ToolRunner>) -> Self {
    Self {
      sync,
      tools,
      scratch_root: settings.scratch_root.clone(),
      result_root: settings.sync.result_root.trim_matches('/').to_string(),
      extractor: ExtractorConfig {
        frame_rate: settings.gait.frame_rate,
        min_depth: settings.gait.min_depth_mm,
        stride_length_adjust: settings.gait.stride_length_adjust,
        band: RatioBand::default(),
      },
    }
  }
}

/// Job-level parameters carried in a stage request's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
  pub trial_id: String,
  /// Subject height in centimetres.
  #[serde(default)]
  pub subject_height: Option<f64>,
  /// Camera focal length in pixels.
  #[serde(default)]
  pub focal_length: Option<f64>,
}

/// Everything one stage run needs.
pub struct StageContext {
  pub env: Arc<StageEnv>,
  pub job_id: String,
  pub kind: StageKind,
  pub params: JobParams,
  pub progress: ProgressReporter,
}

impl StageContext {
  pub fn trial(&self) -> &str {
    &self.params.trial_id
  }

  /// Private scratch directory for this (stage, job).
  pub fn local_dir(&self) -> PathBuf {
    self
      .env
      .scratch_root
      .join(self.kind.as_str())
      .join(&self.job_id)
  }

  pub fn local(&self, relative: &str) -> PathBuf {
    self.local_dir().join(relative.trim_end_matches('/'))
  }

  pub fn remote(&self, relative: &str) -> String {
    if self.env.result_root.is_empty() {
      format!("{}/{}", self.job_id, relative)
    } else {
      format!("{}/{}/{}", self.env.result_root, self.job_id, relative)
    }
  }

  pub fn inputs(&self) -> Vec<Artifact> {
    self.kind.inputs(self.trial())
  }

  pub fn outputs(&self) -> Vec<Artifact> {
    self.kind.outputs(self.trial())
  }

  /// Create the directories output files are written into.
  ///
  /// Output folders themselves are left for the tool to create.
  pub async fn prepare_outputs(&self) -> std::io::Result<()> {
    for artifact in self.outputs() {
      let path = self.local(&artifact.relative);
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
    }
    Ok(())
  }
}
