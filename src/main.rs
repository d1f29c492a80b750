use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use gaitflow_config::{Settings, SyncBackend};
use gaitflow_coordinator::{Coordinator, JobOutcome, PipelineRegistry};
use gaitflow_gait::{ExtractorConfig, GaitExtractor, SignalSeries};
use gaitflow_lock::{IdempotencyGuard, SqliteLockStore};
use gaitflow_queue::{LocalQueue, ProgressReporter, StageRequest};
use gaitflow_stage::{ProcessToolRunner, StageDispatcher, StageEnv, StageKind};
use gaitflow_store::{Job, JobStore, SqliteJobStore};
use gaitflow_sync::{DataSynchronizer, FsStore, RemoteStore, WebDavStore};

/// gaitflow - distributed gait analysis pipelines
#[derive(Parser)]
#[command(name = "gaitflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.gaitflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON settings file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create or upgrade the database schema
  Migrate,

  /// Register a new job and print its id
  Submit {
    #[arg(long)]
    data_type: String,

    #[arg(long)]
    model_name: String,

    #[arg(long)]
    trial_id: String,

    /// Subject height in cm
    #[arg(long)]
    height: Option<f64>,

    /// Camera focal length in pixels
    #[arg(long)]
    focal_length: Option<f64>,
  },

  /// Run a job's pipeline to completion
  Run { job_id: String },

  /// Run a single stage of a job; stage config is read from stdin
  Stage {
    /// Stage name, e.g. turn_time
    stage: String,

    #[arg(long)]
    job: String,
  },

  /// Extract gait parameters from a signal file without the pipeline
  Gait {
    /// SignalSeries JSON
    signal: PathBuf,

    /// Turn-time JSON holding the turning mask
    #[arg(long)]
    turn: PathBuf,
  },

  /// Show a job's status, stage executions and results
  Status { job_id: String },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".gaitflow"),
  };

  let Some(command) = cli.command else {
    println!("gaitflow - use --help to see available commands");
    return Ok(());
  };

  let settings = Settings::load(cli.config.as_deref(), &data_dir).context("invalid settings")?;
  std::fs::create_dir_all(&data_dir)
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Migrate => migrate(&settings).await,
      Commands::Submit {
        data_type,
        model_name,
        trial_id,
        height,
        focal_length,
      } => submit(&settings, data_type, model_name, trial_id, height, focal_length).await,
      Commands::Run { job_id } => run_job(&settings, &job_id).await,
      Commands::Stage { stage, job } => run_stage(&settings, &stage, job).await,
      Commands::Status { job_id } => status(&settings, &job_id).await,
      Commands::Gait { signal, turn } => extract_gait(&settings, &signal, &turn),
    }
  })
}

async fn open_store(settings: &Settings) -> Result<SqliteJobStore> {
  let store = SqliteJobStore::connect(&settings.database_url)
    .await
    .with_context(|| format!("failed to open database: {}", settings.database_url))?;
  store.migrate().await.context("failed to migrate database")?;
  Ok(store)
}

async fn migrate(settings: &Settings) -> Result<()> {
  open_store(settings).await?;
  eprintln!("Database ready: {}", settings.database_url);
  Ok(())
}

async fn submit(
  settings: &Settings,
  data_type: String,
  model_name: String,
  trial_id: String,
  height: Option<f64>,
  focal_length: Option<f64>,
) -> Result<()> {
  let store = open_store(settings).await?;

  let mut job = Job::new(data_type, model_name, trial_id);
  if let Some(height) = height {
    job.subject_height = height;
  }
  if let Some(focal_length) = focal_length {
    job.focal_length = focal_length;
  }
  store.create_job(&job).await.context("failed to create job")?;

  println!("{}", job.job_id);
  Ok(())
}

fn remote_store(settings: &Settings) -> Result<Arc<dyn RemoteStore>> {
  let store: Arc<dyn RemoteStore> = match settings.sync.backend {
    SyncBackend::Webdav => {
      let mut store = WebDavStore::new(&settings.sync.url).context("invalid sync url")?;
      if let Some(user) = &settings.sync.user {
        store = store.with_credentials(user.clone(), settings.sync.password.clone());
      }
      Arc::new(store)
    }
    SyncBackend::Fs => Arc::new(FsStore::new(&settings.sync.url)),
  };
  Ok(store)
}

fn dispatcher(settings: &Settings, store: &SqliteJobStore) -> Result<Arc<StageDispatcher>> {
  let sync = DataSynchronizer::new(remote_store(settings)?);
  let tools = Arc::new(ProcessToolRunner::new(settings.tools.clone()));
  let env = Arc::new(StageEnv::new(settings, sync, tools));
  let locks = Arc::new(SqliteLockStore::new(store.pool().clone()));
  let guard = IdempotencyGuard::new(locks).with_lease(settings.lock_lease());
  Ok(Arc::new(StageDispatcher::new(env, guard)))
}

async fn run_job(settings: &Settings, job_id: &str) -> Result<()> {
  let store = open_store(settings).await?;
  let dispatcher = dispatcher(settings, &store)?;

  let cancel = CancellationToken::new();
  let mut queue = LocalQueue::new(cancel.clone());
  for kind in StageKind::ALL {
    let name = kind.queue();
    queue.register(&name, dispatcher.clone(), settings.concurrency_for(&name));
  }
  let queue = Arc::new(queue);

  let guard = IdempotencyGuard::new(Arc::new(SqliteLockStore::new(store.pool().clone())));
  let registry = PipelineRegistry::gait(settings.result_timeout(), settings.informational_timeout());
  let store = Arc::new(store);
  let coordinator = Coordinator::new(queue.clone(), store, guard, registry)
    .with_poll_interval(settings.poll_interval());

  let outcome = coordinator
    .run_job(job_id)
    .await
    .with_context(|| format!("failed to run job {job_id}"))?;
  queue.shutdown().await;

  match outcome {
    JobOutcome::Completed(results) => {
      println!("{}", serde_json::to_string_pretty(&results)?);
      Ok(())
    }
    JobOutcome::Failed(message) => bail!("job {job_id} failed: {message}"),
    JobOutcome::Skipped => {
      eprintln!("Job {job_id} is already being handled");
      Ok(())
    }
  }
}

async fn run_stage(settings: &Settings, stage: &str, job_id: String) -> Result<()> {
  let kind: StageKind = stage.parse()?;
  let store = open_store(settings).await?;
  let dispatcher = dispatcher(settings, &store)?;

  let config = read_payload_from_stdin()?;
  info!(stage = %kind, job_id = %job_id, "running single stage");

  let value = dispatcher
    .dispatch(
      StageRequest {
        job_id,
        stage: kind.to_string(),
        config,
      },
      ProgressReporter::detached(),
    )
    .await
    .with_context(|| format!("stage {kind} failed"))?;

  println!("{}", serde_json::to_string_pretty(&value)?);
  Ok(())
}

async fn status(settings: &Settings, job_id: &str) -> Result<()> {
  let store = open_store(settings).await?;
  let job = store
    .get_job(job_id)
    .await
    .with_context(|| format!("job '{job_id}' not found"))?;
  let executions = store.list_stage_executions(job_id).await?;
  let results = store.list_results(job_id).await?;

  let report = serde_json::json!({
    "job": job,
    "stages": executions,
    "results": results,
  });
  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}

fn extract_gait(settings: &Settings, signal: &Path, turn: &Path) -> Result<()> {
  let series: SignalSeries = read_json(signal)?;
  let turn_output: serde_json::Value = read_json(turn)?;
  let mask: Vec<bool> = serde_json::from_value(turn_output["mask"].clone())
    .with_context(|| format!("no turning mask in {}", turn.display()))?;

  let config = ExtractorConfig {
    frame_rate: settings.gait.frame_rate,
    min_depth: settings.gait.min_depth_mm,
    stride_length_adjust: settings.gait.stride_length_adjust,
    ..ExtractorConfig::default()
  };
  let report = GaitExtractor::new(config)
    .context("invalid gait settings")?
    .extract(&series, &mask)
    .context("gait extraction failed")?;
  println!("{}", serde_json::to_string_pretty(&report)?);
  Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read stage config from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse stage config JSON from stdin")
    }
  }
}
