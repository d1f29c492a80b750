use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use crate::{ByteStream, RemoteStore, SyncError, require_folder};

/// File and folder transfers between a [`RemoteStore`] and local disk.
#[derive(Clone)]
pub struct DataSynchronizer {
  store: Arc<dyn RemoteStore>,
}

impl DataSynchronizer {
  pub fn new(store: Arc<dyn RemoteStore>) -> Self {
    Self { store }
  }

  /// Whether `remote` exists. Any error is reported as absence.
  pub async fn exists(&self, remote: &str) -> bool {
    match self.store.head(remote).await {
      Ok(found) => found,
      Err(e) => {
        warn!(remote, error = %e, "exists_check_failed");
        false
      }
    }
  }

  /// Fetch one file, creating the local parent directory.
  ///
  /// Data lands in a `.part` sibling first and is renamed into place once
  /// complete, so `local` is never left half-written.
  #[instrument(name = "sync_download", skip(self, local), fields(local = %local.display()))]
  pub async fn download(&self, remote: &str, local: &Path) -> Result<(), SyncError> {
    if let Some(parent) = local.parent() {
      fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(local);
    let result = self.write_partial(remote, &partial).await;
    if let Err(e) = result {
      let _ = fs::remove_file(&partial).await;
      return Err(e);
    }

    fs::rename(&partial, local).await?;
    debug!("artifact_downloaded");
    Ok(())
  }

  async fn write_partial(&self, remote: &str, partial: &Path) -> Result<(), SyncError> {
    let mut stream = self.store.get(remote).await?;
    let mut file = File::create(partial).await?;
    while let Some(chunk) = stream.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
  }

  /// Fetch one small file into memory.
  #[instrument(name = "sync_read", skip(self))]
  pub async fn read(&self, remote: &str) -> Result<Vec<u8>, SyncError> {
    let mut stream = self.store.get(remote).await?;
    let mut content = Vec::new();
    while let Some(chunk) = stream.next().await {
      content.extend_from_slice(&chunk?);
    }
    Ok(content)
  }

  /// Push one file.
  #[instrument(name = "sync_upload", skip(self, local), fields(local = %local.display()))]
  pub async fn upload(&self, local: &Path, remote: &str) -> Result<(), SyncError> {
    let file = File::open(local).await?;
    let stream: ByteStream = Box::pin(ReaderStream::new(file).map(|r| r.map_err(SyncError::Io)));
    self.store.put(remote, stream).await?;
    debug!("artifact_uploaded");
    Ok(())
  }

  /// Fetch every file under `remote_dir` (which must end with `/`) into
  /// `local_dir`, preserving relative layout. Returns the number of files.
  #[instrument(name = "sync_download_folder", skip(self, local_dir))]
  pub async fn download_folder(&self, remote_dir: &str, local_dir: &Path) -> Result<usize, SyncError> {
    require_folder(remote_dir)?;
    fs::create_dir_all(local_dir).await?;

    let files = self.remote_files(remote_dir).await?;
    for relative in &files {
      let remote = format!("{remote_dir}{relative}");
      self.download(&remote, &local_dir.join(relative)).await?;
    }

    debug!(files = files.len(), "folder_downloaded");
    Ok(files.len())
  }

  /// Push every file under `local_dir` to `remote_dir` (which must end with
  /// `/`), creating remote collections as needed. Returns the number of files.
  #[instrument(name = "sync_upload_folder", skip(self, local_dir))]
  pub async fn upload_folder(&self, local_dir: &Path, remote_dir: &str) -> Result<usize, SyncError> {
    require_folder(remote_dir)?;
    self.store.mkcol(remote_dir).await?;

    let (dirs, files) = local_tree(local_dir).await?;
    for relative in &dirs {
      self.store.mkcol(&format!("{remote_dir}{relative}/")).await?;
    }
    for relative in &files {
      let remote = format!("{remote_dir}{relative}");
      self.upload(&local_dir.join(relative), &remote).await?;
    }

    debug!(files = files.len(), "folder_uploaded");
    Ok(files.len())
  }

  /// Relative paths of every file below `remote_dir`, walking one listing
  /// level at a time.
  async fn remote_files(&self, remote_dir: &str) -> Result<Vec<String>, SyncError> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(prefix) = pending.pop() {
      let entries = self.store.list(&format!("{remote_dir}{prefix}")).await?;
      for entry in entries {
        check_entry_name(remote_dir, &entry.name)?;
        if entry.is_dir() {
          pending.push(format!("{prefix}{}/", entry.name));
        } else {
          files.push(format!("{prefix}{}", entry.name));
        }
      }
    }

    files.sort();
    Ok(files)
  }
}

/// Listed names become local path components; they must stay one level deep.
fn check_entry_name(remote_dir: &str, name: &str) -> Result<(), SyncError> {
  if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
    return Err(SyncError::Protocol {
      path: remote_dir.to_string(),
      message: format!("listing contains unsafe entry name '{name}'"),
    });
  }
  Ok(())
}

fn partial_path(local: &Path) -> PathBuf {
  let mut name = local
    .file_name()
    .map(|n| n.to_os_string())
    .unwrap_or_default();
  name.push(".part");
  local.with_file_name(name)
}

/// Relative (`/`-separated) directories and files below `root`.
async fn local_tree(root: &Path) -> Result<(Vec<String>, Vec<String>), SyncError> {
  let mut dirs = Vec::new();
  let mut files = Vec::new();
  let mut pending = vec![String::new()];

  while let Some(prefix) = pending.pop() {
    let mut reader = fs::read_dir(root.join(&prefix)).await?;
    while let Some(entry) = reader.next_entry().await? {
      let name = entry.file_name().to_string_lossy().into_owned();
      let relative = format!("{prefix}{name}");
      if entry.file_type().await?.is_dir() {
        pending.push(format!("{relative}/"));
        dirs.push(relative);
      } else {
        files.push(relative);
      }
    }
  }

  dirs.sort();
  files.sort();
  Ok((dirs, files))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_names_stay_inside_folder() {
    assert!(check_entry_name("out/", "a.json").is_ok());
    assert!(check_entry_name("out/", "..hidden").is_ok());
    for name in ["", ".", "..", "../escape", "a/b", "a\\b"] {
      let err = check_entry_name("out/", name).unwrap_err();
      assert!(matches!(err, SyncError::Protocol { .. }), "{name}");
    }
  }

  #[test]
  fn test_partial_path_is_sibling() {
    let partial = partial_path(Path::new("/tmp/job/out/a.csv"));
    assert_eq!(partial, PathBuf::from("/tmp/job/out/a.csv.part"));
  }
}
