use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gaitflow_config::Settings;
use gaitflow_gait::{FrameSample, LegSample, SignalSeries};
use gaitflow_lock::{IdempotencyGuard, InMemoryLockStore};
use gaitflow_queue::{ProgressReporter, StageRequest};
use gaitflow_stage::{
  StageDispatcher, StageEnv, StageError, StageKind, ToolError, ToolInvocation, ToolRunner,
};
use gaitflow_sync::{DataSynchronizer, FsStore};
use serde_json::{Value, json};
use tempfile::TempDir;

type Script = Box<dyn Fn(&ToolInvocation) -> std::io::Result<()> + Send + Sync>;

/// Tool runner that runs a scripted closure per tool name and records every
/// call.
#[derive(Default)]
struct FakeTools {
  scripts: HashMap<String, Script>,
  calls: Mutex<Vec<String>>,
}

impl FakeTools {
  fn with(
    mut self,
    tool: &str,
    script: impl Fn(&ToolInvocation) -> std::io::Result<()> + Send + Sync + 'static,
  ) -> Self {
    self.scripts.insert(tool.to_string(), Box::new(script));
    self
  }

  fn calls(&self, tool: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|t| *t == tool).count()
  }
}

#[async_trait]
impl ToolRunner for FakeTools {
  async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
    self.calls.lock().unwrap().push(invocation.tool.clone());
    let script = self
      .scripts
      .get(&invocation.tool)
      .ok_or_else(|| ToolError::NotConfigured {
        tool: invocation.tool.clone(),
      })?;
    script(invocation).map_err(|e| ToolError::Failed {
      tool: invocation.tool.clone(),
      status: "exit status: 1".into(),
      stderr: e.to_string(),
    })
  }
}

fn write(path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> std::io::Result<()> {
  let path = path.as_ref();
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, content)
}

struct Harness {
  dir: TempDir,
  tools: Arc<FakeTools>,
  dispatcher: StageDispatcher,
}

impl Harness {
  fn new(tools: FakeTools) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::with_data_dir(dir.path());
    settings.sync.result_root = "results".into();

    let tools = Arc::new(tools);
    let sync = DataSynchronizer::new(Arc::new(FsStore::new(dir.path().join("remote"))));
    let env = Arc::new(StageEnv::new(&settings, sync, tools.clone()));
    let guard = IdempotencyGuard::new(Arc::new(InMemoryLockStore::new()));

    Self {
      dir,
      tools,
      dispatcher: StageDispatcher::new(env, guard),
    }
  }

  fn remote(&self, relative: &str) -> PathBuf {
    self.dir.path().join("remote/results/job-1").join(relative)
  }

  fn seed(&self, relative: &str, content: impl AsRef<[u8]>) {
    write(self.remote(relative), content).unwrap();
  }

  fn scratch(&self, stage: StageKind) -> PathBuf {
    self.dir.path().join("scratch").join(stage.as_str()).join("job-1")
  }

  async fn run(&self, stage: StageKind) -> Result<Value, StageError> {
    self.run_with(stage, ProgressReporter::detached()).await
  }

  async fn run_with(
    &self,
    stage: StageKind,
    progress: ProgressReporter,
  ) -> Result<Value, StageError> {
    let request = StageRequest {
      job_id: "job-1".into(),
      stage: stage.as_str().into(),
      config: json!({ "trial_id": "walk", "focal_length": 1392.0, "subject_height": 172.0 }),
    };
    self.dispatcher.dispatch(request, progress).await
  }
}

fn arg(invocation: &ToolInvocation, index: usize) -> PathBuf {
  PathBuf::from(&invocation.args[index])
}

fn turn_time_tool(invocation: &ToolInvocation) -> std::io::Result<()> {
  let mask: Vec<bool> = (0..300).map(|t| (140..160).contains(&t)).collect();
  write(
    arg(invocation, 1),
    serde_json::to_vec(&json!({ "turn_time": 0.67, "mask": mask }))?,
  )
}

#[tokio::test]
async fn test_turn_time_lifecycle() {
  let harness = Harness::new(FakeTools::default().with("turn_time", turn_time_tool));
  harness.seed("out/3d/walk.mp4.npy", b"keypoints");

  let progress = ProgressReporter::detached();
  let value = harness
    .run_with(StageKind::TurnTime, progress.clone())
    .await
    .unwrap();

  assert_eq!(value, json!(0.67));
  assert!(harness.remote("out/walk-tt.json").exists());
  assert!(!harness.scratch(StageKind::TurnTime).exists());

  let last = progress.current().unwrap();
  assert_eq!((last.percent, last.label.as_str()), (100, "uploading data"));
}

#[tokio::test]
async fn test_second_invocation_is_skipped() {
  let harness = Harness::new(FakeTools::default().with("turn_time", turn_time_tool));
  harness.seed("out/3d/walk.mp4.npy", b"keypoints");

  assert_eq!(harness.run(StageKind::TurnTime).await.unwrap(), json!(0.67));
  // the repeat does no work but answers with the uploaded result
  assert_eq!(harness.run(StageKind::TurnTime).await.unwrap(), json!(0.67));
  assert_eq!(harness.tools.calls("turn_time"), 1);
  assert!(!harness.scratch(StageKind::TurnTime).exists());
}

#[tokio::test]
async fn test_skipped_stage_without_uploaded_result_answers_true() {
  let harness = Harness::new(
    FakeTools::default().with("turn_time", |_| Err(std::io::Error::other("no skeleton found"))),
  );
  harness.seed("out/3d/walk.mp4.npy", b"keypoints");

  // without a lease the failed run keeps its lock
  assert!(harness.run(StageKind::TurnTime).await.is_err());
  assert_eq!(harness.run(StageKind::TurnTime).await.unwrap(), json!(true));
  assert_eq!(harness.tools.calls("turn_time"), 1);
}

#[tokio::test]
async fn test_skipped_artifact_stage_answers_true() {
  let harness = Harness::new(FakeTools::default().with("openpose", |inv| {
    write(arg(inv, 1), b"rendered")?;
    write(arg(inv, 2).join("walk_000000000000_keypoints.json"), "{}")
  }));
  harness.seed("out/walk.avi", b"video");

  assert_eq!(harness.run(StageKind::Openpose).await.unwrap(), json!(true));
  assert_eq!(harness.run(StageKind::Openpose).await.unwrap(), json!(true));
  assert_eq!(harness.tools.calls("openpose"), 1);
}

#[tokio::test]
async fn test_missing_input_fails_fetch() {
  let harness = Harness::new(FakeTools::default().with("turn_time", turn_time_tool));

  let err = harness.run(StageKind::TurnTime).await.unwrap_err();
  assert!(matches!(err, StageError::Transfer { ref path, .. } if path == "results/job-1/out/3d/walk.mp4.npy"));
  assert_eq!(harness.tools.calls("turn_time"), 0);
}

#[tokio::test]
async fn test_missing_output_keeps_scratch() {
  let harness = Harness::new(FakeTools::default().with("render_2d", |_| Ok(())));
  for input in StageKind::VideoGeneration2d.inputs("walk") {
    harness.seed(&input.relative, b"x");
  }

  let err = harness.run(StageKind::VideoGeneration2d).await.unwrap_err();
  assert!(matches!(err, StageError::MissingOutput { .. }));
  assert!(harness.scratch(StageKind::VideoGeneration2d).exists());
  assert!(!harness.remote("out/render.mp4").exists());
}

#[tokio::test]
async fn test_tool_failure_surfaces() {
  let harness = Harness::new(
    FakeTools::default().with("turn_time", |_| Err(std::io::Error::other("no skeleton found"))),
  );
  harness.seed("out/3d/walk.mp4.npy", b"keypoints");

  let err = harness.run(StageKind::TurnTime).await.unwrap_err();
  assert!(err.to_string().contains("no skeleton found"), "{err}");
}

#[tokio::test]
async fn test_openpose_uploads_keypoint_folder() {
  let harness = Harness::new(FakeTools::default().with("openpose", |inv| {
    // inputs first, then outputs: avi, keypoints avi, json folder
    write(arg(inv, 1), b"rendered")?;
    let json_dir = arg(inv, 2);
    write(json_dir.join("walk_000000000000_keypoints.json"), "{}")?;
    write(json_dir.join("walk_000000000001_keypoints.json"), "{}")
  }));
  harness.seed("out/walk.avi", b"video");

  assert_eq!(harness.run(StageKind::Openpose).await.unwrap(), json!(true));
  assert!(harness.remote("out/walk-keypoints.avi").exists());
  assert!(
    harness
      .remote("out/walk-json/walk_000000000001_keypoints.json")
      .exists()
  );
}

#[tokio::test]
async fn test_svo_conversion_retries_export() {
  let attempts = Arc::new(Mutex::new(0));
  let counter = attempts.clone();
  let tools = FakeTools::default()
    .with("svo_export", move |inv| {
      let mut n = counter.lock().unwrap();
      *n += 1;
      if *n == 1 {
        return Err(std::io::Error::other("grab failed"));
      }
      write(arg(inv, 1), b"avi")
    })
    .with("avi_to_mp4", |inv| write(arg(inv, 1), b"mp4"));
  let harness = Harness::new(tools);
  harness.seed("input/walk.svo", b"stereo");

  harness.run(StageKind::SvoConversion).await.unwrap();
  assert_eq!(harness.tools.calls("svo_export"), 2);
  assert!(harness.remote("out/walk.avi").exists());
  assert!(harness.remote("input/walk.mp4").exists());
}

#[tokio::test]
async fn test_depth_sensing_exhaustion_is_fatal() {
  let harness = Harness::new(FakeTools::default().with("depth_sensing", |_| Ok(())));
  harness.seed("input/walk.svo", b"stereo");
  harness.seed("input/walk.txt", "1,33\n2,67");
  harness.seed("out/walk-json/walk_000000000000_keypoints.json", "{}");
  harness.seed("out/walk-json/walk_000000000001_keypoints.json", "{}");

  let err = harness.run(StageKind::SvoDepthSensing).await.unwrap_err();
  assert!(matches!(err, StageError::RetriesExhausted { attempts: 10, .. }));
  assert_eq!(harness.tools.calls("depth_sensing"), 10);

  // timestamps were repaired before the sensor ran
  let txt = harness.scratch(StageKind::SvoDepthSensing).join("input/walk.txt");
  assert_eq!(std::fs::read_to_string(txt).unwrap(), "1,33\n2,67\n");
}

fn synthetic_signal() -> SignalSeries {
  let frames = (0..300usize)
    .map(|t| {
      let swing = if t < 10 {
        0.0
      } else if (t - 10) % 40 < 20 {
        200.0
      } else {
        -200.0
      };
      let base = if t < 150 {
        2000.0 + 10.0 * t as f64
      } else {
        2000.0 + 10.0 * (300 - t) as f64
      };
      FrameSample {
        left: LegSample {
          horizontal: 0.0,
          lateral: 100.0,
          depth: base + swing / 2.0,
        },
        right: LegSample {
          horizontal: 0.0,
          lateral: -100.0,
          depth: base - swing / 2.0,
        },
      }
    })
    .collect();
  SignalSeries::new(frames)
}

#[tokio::test]
async fn test_depth_estimation_extracts_gait() {
  let harness = Harness::new(FakeTools::default().with("depth_estimator", |inv| {
    assert!(inv.args.contains(&"--focal-length".to_string()));
    write(arg(inv, 2), serde_json::to_vec(&synthetic_signal())?)
  }));
  harness.seed("out/walk-custom-dataset.npz", b"npz");
  harness.seed("out/3d/walk.mp4.npy", b"npy");
  let mask: Vec<bool> = (0..300).map(|t| (140..160).contains(&t)).collect();
  harness.seed(
    "out/walk-tt.json",
    serde_json::to_vec(&json!({ "turn_time": 0.67, "mask": mask })).unwrap(),
  );

  let value = harness.run(StageKind::DepthEstimation).await.unwrap();
  assert_eq!(value["interval_count"], json!(10));
  assert!((value["stride_length"].as_f64().unwrap() - 40.0).abs() < 1e-9);
  assert!((value["cadence"].as_f64().unwrap() - 45.0).abs() < 1e-9);

  let report: Value =
    serde_json::from_slice(&std::fs::read(harness.remote("out/walk-gait.json")).unwrap()).unwrap();
  assert_eq!(report["strides"].as_array().unwrap().len(), 10);

  // a rerun of the job gets the same summary back from the uploaded report
  let again = harness.run(StageKind::DepthEstimation).await.unwrap();
  assert_eq!(again["interval_count"], json!(10));
  for field in ["stride_length", "stride_width", "stride_time", "velocity", "cadence"] {
    let (a, b) = (again[field].as_f64().unwrap(), value[field].as_f64().unwrap());
    assert!((a - b).abs() < 1e-9, "{field}: {a} vs {b}");
  }
  assert_eq!(harness.tools.calls("depth_estimator"), 1);
}

#[tokio::test]
async fn test_r_estimation_weighted_summary() {
  let harness = Harness::new(FakeTools::default().with("gait_stats", |inv| {
    write(arg(inv, 1), "stride,length\n")?;
    let summary = json!({
      "left": { "size": 3, "stride_length": 1000.0, "stride_width": 90.0, "stride_time": 1100.0 },
      "right": { "size": 1, "stride_length": 1400.0, "stride_width": 130.0, "stride_time": 1300.0 },
      "cadence": 105.0,
      "velocity": 1.05
    });
    write(arg(inv, 2).join("walk-summary.json"), serde_json::to_vec(&summary)?)
  }));
  harness.seed("out/walk-raw.csv", "frame,depth\n");

  let value = harness.run(StageKind::REstimation).await.unwrap();
  assert_eq!(value["stride_length"], json!(1100.0));
  assert_eq!(value["stride_width"], json!(100.0));
  assert_eq!(value["stride_time"], json!(1150.0));
  assert_eq!(value["cadence"], json!(105.0));
  assert!(harness.remote("out/zGait/walk-summary.json").exists());
  assert!(harness.remote("out/walk.csv").exists());

  let again = harness.run(StageKind::REstimation).await.unwrap();
  assert_eq!(again, value);
  assert_eq!(harness.tools.calls("gait_stats"), 1);
}

#[tokio::test]
async fn test_unknown_stage_rejected() {
  let harness = Harness::new(FakeTools::default());
  let request = StageRequest {
    job_id: "job-1".into(),
    stage: "rendering".into(),
    config: json!({ "trial_id": "walk" }),
  };
  let err = harness
    .dispatcher
    .dispatch(request, ProgressReporter::detached())
    .await
    .unwrap_err();
  assert!(matches!(err, StageError::UnknownStage { .. }));
}
