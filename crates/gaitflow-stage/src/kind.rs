use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StageError;

/// Whether an artifact is a single file or a whole folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
  File,
  Folder,
}

/// A file or folder exchanged between stages, relative to a job's root.
///
/// Folder paths end with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub relative: String,
  pub kind: ArtifactKind,
}

impl Artifact {
  pub fn file(relative: impl Into<String>) -> Self {
    Self {
      relative: relative.into(),
      kind: ArtifactKind::File,
    }
  }

  pub fn folder(relative: impl Into<String>) -> Self {
    let mut relative = relative.into();
    if !relative.ends_with('/') {
      relative.push('/');
    }
    Self {
      relative,
      kind: ArtifactKind::Folder,
    }
  }
}

/// The fixed set of gait pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
  SvoConversion,
  Openpose,
  TrackAndExtract,
  SvoDepthSensing,
  TurnTime,
  DepthEstimation,
  REstimation,
  VideoGeneration2d,
  VideoGeneration3d,
}

impl StageKind {
  pub const ALL: [StageKind; 9] = [
    StageKind::SvoConversion,
    StageKind::Openpose,
    StageKind::TrackAndExtract,
    StageKind::SvoDepthSensing,
    StageKind::TurnTime,
    StageKind::DepthEstimation,
    StageKind::REstimation,
    StageKind::VideoGeneration2d,
    StageKind::VideoGeneration3d,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      StageKind::SvoConversion => "svo_conversion",
      StageKind::Openpose => "openpose",
      StageKind::TrackAndExtract => "track_and_extract",
      StageKind::SvoDepthSensing => "svo_depth_sensing",
      StageKind::TurnTime => "turn_time",
      StageKind::DepthEstimation => "depth_estimation",
      StageKind::REstimation => "r_estimation",
      StageKind::VideoGeneration2d => "video_generation_2d",
      StageKind::VideoGeneration3d => "video_generation_3d",
    }
  }

  pub fn queue(self) -> String {
    gaitflow_queue::queue_name(self.as_str())
  }

  /// Artifacts downloaded before execution.
  pub fn inputs(self, trial: &str) -> Vec<Artifact> {
    match self {
      StageKind::SvoConversion => vec![Artifact::file(format!("input/{trial}.svo"))],
      StageKind::Openpose => vec![Artifact::file(format!("out/{trial}.avi"))],
      StageKind::TrackAndExtract => vec![Artifact::file(format!("input/{trial}.mp4"))],
      StageKind::SvoDepthSensing => vec![
        Artifact::file(format!("input/{trial}.svo")),
        Artifact::file(format!("input/{trial}.txt")),
        Artifact::folder(format!("out/{trial}-json/")),
      ],
      StageKind::TurnTime => vec![Artifact::file(format!("out/3d/{trial}.mp4.npy"))],
      StageKind::DepthEstimation => vec![
        Artifact::file(format!("out/{trial}-custom-dataset.npz")),
        Artifact::file(format!("out/3d/{trial}.mp4.npy")),
        Artifact::file(format!("out/{trial}-tt.json")),
      ],
      StageKind::REstimation => vec![Artifact::file(format!("out/{trial}-raw.csv"))],
      StageKind::VideoGeneration2d => vec![
        Artifact::file(format!("input/{trial}.mp4")),
        Artifact::file(format!("out/{trial}-custom-dataset.npz")),
        Artifact::file(format!("out/{trial}-target_person_bboxes.pickle")),
        Artifact::file(format!("out/{trial}-tt.json")),
      ],
      StageKind::VideoGeneration3d => vec![
        Artifact::file(format!("input/{trial}.mp4")),
        Artifact::folder(format!("out/{trial}-json/")),
        Artifact::file(format!("out/{trial}-target_person_bboxes.pickle")),
        Artifact::file(format!("out/{trial}-custom-dataset.npz")),
        Artifact::file(format!("out/{trial}-tt.json")),
      ],
    }
  }

  /// Artifacts uploaded after execution.
  pub fn outputs(self, trial: &str) -> Vec<Artifact> {
    match self {
      StageKind::SvoConversion => vec![
        Artifact::file(format!("input/{trial}.mp4")),
        Artifact::file(format!("out/{trial}.avi")),
      ],
      StageKind::Openpose => vec![
        Artifact::file(format!("out/{trial}-keypoints.avi")),
        Artifact::folder(format!("out/{trial}-json/")),
      ],
      StageKind::TrackAndExtract => vec![
        Artifact::file(format!("out/{trial}.mot.txt")),
        Artifact::file(format!("out/{trial}-target_person_bboxes.pickle")),
        Artifact::file(format!("out/{trial}-custom-dataset.npz")),
        Artifact::folder("out/2d/"),
        Artifact::folder("out/3d/"),
      ],
      StageKind::SvoDepthSensing => vec![Artifact::file(format!("out/{trial}-raw.csv"))],
      StageKind::TurnTime => vec![Artifact::file(format!("out/{trial}-tt.json"))],
      StageKind::DepthEstimation => vec![
        Artifact::file(format!("out/{trial}-signal.json")),
        Artifact::file(format!("out/{trial}-gait.json")),
      ],
      StageKind::REstimation => vec![
        Artifact::file(format!("out/{trial}.csv")),
        Artifact::folder("out/zGait/"),
      ],
      StageKind::VideoGeneration2d | StageKind::VideoGeneration3d => vec![
        Artifact::file("out/render.mp4"),
        Artifact::file("out/render-black-background.mp4"),
      ],
    }
  }
}

impl std::fmt::Display for StageKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StageKind {
  type Err = StageError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    StageKind::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| StageError::UnknownStage {
        name: s.to_string(),
      })
  }
}
