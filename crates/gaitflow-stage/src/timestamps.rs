//! Reconciles a trial's frame timestamp file with its pose frames.
//!
//! The depth sensor reads one `frame,millis` line per pose frame and rejects
//! files whose last line lacks a newline or whose line count disagrees with
//! the number of per-frame JSON files.

use std::ffi::OsString;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Nominal camera frame rate used when timestamps must be regenerated.
const NOMINAL_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampRepair {
  Unchanged,
  /// More timestamps than frames; extra lines dropped.
  Truncated { lines: usize, frames: usize },
  /// Fewer timestamps than frames; file rewritten at the nominal rate.
  Regenerated { lines: usize, frames: usize },
}

/// Append a newline if the file does not end with one. Returns whether the
/// file was changed.
pub async fn ensure_trailing_newline(path: &Path) -> std::io::Result<bool> {
  let mut content = tokio::fs::read_to_string(path).await?;
  if content.is_empty() || content.ends_with('\n') {
    return Ok(false);
  }
  content.push('\n');
  tokio::fs::write(path, content).await?;
  Ok(true)
}

/// Make `timestamps` agree with the number of `.json` files in `json_dir`.
///
/// Whenever the file is rewritten the original is kept next to it with an
/// `.old` suffix.
pub async fn repair_timestamp_file(
  timestamps: &Path,
  json_dir: &Path,
) -> std::io::Result<TimestampRepair> {
  if ensure_trailing_newline(timestamps).await? {
    info!(path = %timestamps.display(), "timestamp_newline_added");
  }

  let content = tokio::fs::read_to_string(timestamps).await?;
  let entries = parse_timestamps(&content)?;
  let frames = count_json_files(json_dir).await?;
  let lines = entries.len();

  let (repair, rewritten) = if frames < lines {
    let kept: String = entries[..frames]
      .iter()
      .map(|(index, millis)| format!("{index},{millis}\n"))
      .collect();
    (TimestampRepair::Truncated { lines, frames }, kept)
  } else if frames > lines {
    let regenerated: String = (1..=frames)
      .map(|frame| format!("{frame},{}\n", nominal_millis(frame)))
      .collect();
    (TimestampRepair::Regenerated { lines, frames }, regenerated)
  } else {
    return Ok(TimestampRepair::Unchanged);
  };

  tokio::fs::copy(timestamps, backup_path(timestamps)).await?;
  tokio::fs::write(timestamps, rewritten).await?;
  warn!(path = %timestamps.display(), ?repair, "timestamp_file_repaired");
  Ok(repair)
}

fn nominal_millis(frame: usize) -> u64 {
  (1000.0 / NOMINAL_FPS * frame as f64).round() as u64
}

fn backup_path(path: &Path) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(".old");
  PathBuf::from(name)
}

fn parse_timestamps(content: &str) -> std::io::Result<Vec<(u64, u64)>> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(|line| {
      let parsed = line.split_once(',').and_then(|(index, millis)| {
        let index = index.trim().parse::<u64>().ok()?;
        let millis = millis.trim().parse::<u64>().ok()?;
        Some((index, millis))
      });
      parsed.ok_or_else(|| {
        Error::new(
          ErrorKind::InvalidData,
          format!("malformed timestamp line '{line}'"),
        )
      })
    })
    .collect()
}

async fn count_json_files(dir: &Path) -> std::io::Result<usize> {
  let mut entries = tokio::fs::read_dir(dir).await?;
  let mut count = 0;
  while let Some(entry) = entries.next_entry().await? {
    if entry.path().extension().is_some_and(|ext| ext == "json") {
      count += 1;
    }
  }
  Ok(count)
}
