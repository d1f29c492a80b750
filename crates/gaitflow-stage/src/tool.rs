//! External tool invocation.
//!
//! Stages never spawn processes directly; they describe a [`ToolInvocation`]
//! and hand it to a [`ToolRunner`]. The production runner maps tool names to
//! configured programs, tests substitute a fake.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use gaitflow_config::ToolSettings;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{StageError, ToolError};

/// Characters of stderr kept in a failure message.
const STDERR_TAIL: usize = 512;

/// One call of a named tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
  pub tool: String,
  pub args: Vec<String>,
  pub working_dir: PathBuf,
}

impl ToolInvocation {
  pub fn new(tool: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
    Self {
      tool: tool.into(),
      args: Vec::new(),
      working_dir: working_dir.into(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn path_arg(self, path: &Path) -> Self {
    let arg = path.display().to_string();
    self.arg(arg)
  }
}

/// Runs external tools to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
  async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError>;
}

/// Runs tools as child processes.
///
/// Each tool name maps to a program and leading arguments; the invocation's
/// own arguments are appended.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner {
  tools: HashMap<String, ToolSettings>,
}

impl ProcessToolRunner {
  pub fn new(tools: HashMap<String, ToolSettings>) -> Self {
    Self { tools }
  }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
  async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
    let settings = self
      .tools
      .get(&invocation.tool)
      .ok_or_else(|| ToolError::NotConfigured {
        tool: invocation.tool.clone(),
      })?;

    info!(
      tool = %invocation.tool,
      program = %settings.program,
      args = ?invocation.args,
      "tool_started"
    );

    let output = Command::new(&settings.program)
      .args(&settings.args)
      .args(&invocation.args)
      .current_dir(&invocation.working_dir)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| ToolError::Spawn {
        tool: invocation.tool.clone(),
        source,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(ToolError::Failed {
        tool: invocation.tool.clone(),
        status: output.status.to_string(),
        stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
      });
    }

    info!(tool = %invocation.tool, "tool_completed");
    Ok(())
  }
}

fn tail(s: &str, max_chars: usize) -> &str {
  let count = s.chars().count();
  if count <= max_chars {
    return s;
  }
  match s.char_indices().nth(count - max_chars) {
    Some((index, _)) => &s[index..],
    None => s,
  }
}

/// Run `invocation` until `expected` exists, at most `attempts` times.
///
/// A tool error counts as a failed attempt. Returns the number of attempts
/// used.
pub async fn run_until_exists(
  runner: &dyn ToolRunner,
  stage: &str,
  invocation: &ToolInvocation,
  attempts: usize,
  expected: &Path,
) -> Result<usize, StageError> {
  for attempt in 1..=attempts {
    if let Err(e) = runner.run(invocation).await {
      warn!(stage, tool = %invocation.tool, attempt, error = %e, "tool_attempt_failed");
    }
    if tokio::fs::try_exists(expected).await? {
      return Ok(attempt);
    }
    warn!(
      stage,
      tool = %invocation.tool,
      attempt,
      expected = %expected.display(),
      "tool_output_missing"
    );
  }

  Err(StageError::RetriesExhausted {
    stage: stage.to_string(),
    tool: invocation.tool.clone(),
    attempts,
  })
}
