use std::collections::HashMap;
use std::time::Duration;

use gaitflow_stage::StageKind;

use crate::results::ResultSource;

/// Value substituted for a stage result that could not be retrieved.
pub const SENTINEL: f64 = -1.0;

/// Data type and model name of the 2D video pipeline.
pub const GAIT_2D: (&str, &str) = ("gait_mp4", "gait_2d::v1");
/// Data type and model name of the stereo (SVO) pipeline.
pub const GAIT_SVO: (&str, &str) = ("gait_svo_and_txt", "gait_svo::v1");

/// Focal length, in pixels, of the camera the 2D depth model was trained on.
pub const GAIT_2D_FOCAL_LENGTH: f64 = 1392.0;

/// Bounded result retrieval with a substitute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
  pub timeout: Duration,
  pub sentinel: f64,
}

impl Fallback {
  pub fn new(timeout: Duration) -> Self {
    Self {
      timeout,
      sentinel: SENTINEL,
    }
  }
}

/// How a stage's outcome affects the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criticality {
  /// Polled until ready; failure stops the pipeline. With a fallback, the
  /// result itself is fetched with a bounded wait.
  Required { fallback: Option<Fallback> },
  /// Waited on for at most the fallback timeout; timeout or failure yields
  /// the sentinel.
  Informational(Fallback),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSpec {
  pub kind: StageKind,
  pub criticality: Criticality,
}

impl StageSpec {
  pub fn required(kind: StageKind) -> Self {
    Self {
      kind,
      criticality: Criticality::Required { fallback: None },
    }
  }

  pub fn required_with_fallback(kind: StageKind, fallback: Fallback) -> Self {
    Self {
      kind,
      criticality: Criticality::Required {
        fallback: Some(fallback),
      },
    }
  }

  pub fn informational(kind: StageKind, fallback: Fallback) -> Self {
    Self {
      kind,
      criticality: Criticality::Informational(fallback),
    }
  }
}

/// One position in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
  Sequential(StageSpec),
  /// Independent stages submitted together and joined before moving on.
  Fork(Vec<StageSpec>),
}

impl Step {
  pub fn stages(&self) -> &[StageSpec] {
    match self {
      Step::Sequential(spec) => std::slice::from_ref(spec),
      Step::Fork(specs) => specs,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
  pub name: String,
  pub steps: Vec<Step>,
  /// Replaces the job's own focal length when set.
  pub focal_length: Option<f64>,
  pub results: ResultSource,
}

impl Pipeline {
  /// Monocular video: track, measure the turn, then estimate depth and
  /// render in parallel.
  pub fn gait_2d(result_timeout: Duration, informational_timeout: Duration) -> Self {
    Self {
      name: "gait_2d".to_string(),
      steps: vec![
        Step::Sequential(StageSpec::required(StageKind::TrackAndExtract)),
        Step::Sequential(StageSpec::required_with_fallback(
          StageKind::TurnTime,
          Fallback::new(result_timeout),
        )),
        Step::Fork(vec![
          StageSpec::required(StageKind::DepthEstimation),
          StageSpec::informational(
            StageKind::VideoGeneration2d,
            Fallback::new(informational_timeout),
          ),
        ]),
      ],
      focal_length: Some(GAIT_2D_FOCAL_LENGTH),
      results: ResultSource::GaitSummary,
    }
  }

  /// Stereo recording: convert, detect pose, track, sense depth, measure the
  /// turn, then compute statistics and render in parallel.
  pub fn gait_svo(result_timeout: Duration, informational_timeout: Duration) -> Self {
    Self {
      name: "gait_svo".to_string(),
      steps: vec![
        Step::Sequential(StageSpec::required(StageKind::SvoConversion)),
        Step::Sequential(StageSpec::required(StageKind::Openpose)),
        Step::Sequential(StageSpec::required(StageKind::TrackAndExtract)),
        Step::Sequential(StageSpec::required(StageKind::SvoDepthSensing)),
        Step::Sequential(StageSpec::required_with_fallback(
          StageKind::TurnTime,
          Fallback::new(result_timeout),
        )),
        Step::Fork(vec![
          StageSpec::required(StageKind::REstimation),
          StageSpec::informational(
            StageKind::VideoGeneration3d,
            Fallback::new(informational_timeout),
          ),
        ]),
      ],
      focal_length: None,
      results: ResultSource::StatsSummary,
    }
  }

  /// Every stage in submission order.
  pub fn stages(&self) -> impl Iterator<Item = &StageSpec> {
    self.steps.iter().flat_map(Step::stages)
  }
}

/// Pipelines keyed by (data type, model name).
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
  pipelines: HashMap<(String, String), Pipeline>,
}

impl PipelineRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The 2D and SVO gait pipelines.
  pub fn gait(result_timeout: Duration, informational_timeout: Duration) -> Self {
    let mut registry = Self::new();
    registry.register(
      GAIT_2D.0,
      GAIT_2D.1,
      Pipeline::gait_2d(result_timeout, informational_timeout),
    );
    registry.register(
      GAIT_SVO.0,
      GAIT_SVO.1,
      Pipeline::gait_svo(result_timeout, informational_timeout),
    );
    registry
  }

  pub fn register(&mut self, data_type: &str, model_name: &str, pipeline: Pipeline) {
    self
      .pipelines
      .insert((data_type.to_string(), model_name.to_string()), pipeline);
  }

  pub fn get(&self, data_type: &str, model_name: &str) -> Option<&Pipeline> {
    self
      .pipelines
      .get(&(data_type.to_string(), model_name.to_string()))
  }

  pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .pipelines
      .keys()
      .map(|(data_type, model)| (data_type.as_str(), model.as_str()))
  }
}
