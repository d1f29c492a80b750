use std::path::PathBuf;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::{ByteStream, Entry, EntryKind, RemoteStore, SyncError};

/// Remote store backed by a local directory.
///
/// Each remote path maps to `{base_path}/{path}`. Useful for tests and for
/// deployments where every worker shares one filesystem.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn key_to_path(&self, path: &str) -> PathBuf {
    self.base_path.join(path.trim_start_matches('/'))
  }
}

fn not_found(path: &str, e: std::io::Error) -> SyncError {
  if e.kind() == std::io::ErrorKind::NotFound {
    SyncError::NotFound {
      path: path.to_string(),
    }
  } else {
    SyncError::Io(e)
  }
}

#[async_trait]
impl RemoteStore for FsStore {
  async fn head(&self, path: &str) -> Result<bool, SyncError> {
    Ok(fs::try_exists(self.key_to_path(path)).await?)
  }

  async fn get(&self, path: &str) -> Result<ByteStream, SyncError> {
    let file = File::open(self.key_to_path(path))
      .await
      .map_err(|e| not_found(path, e))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(SyncError::Io));
    Ok(Box::pin(stream))
  }

  async fn put(&self, path: &str, data: ByteStream) -> Result<(), SyncError> {
    let target = self.key_to_path(path);

    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent).await?;
    }

    let mut file = File::create(target).await?;
    let mut stream = std::pin::pin!(data);

    while let Some(chunk) = stream.next().await {
      let bytes = chunk?;
      file.write_all(&bytes).await?;
    }

    file.flush().await?;
    Ok(())
  }

  async fn mkcol(&self, path: &str) -> Result<(), SyncError> {
    fs::create_dir_all(self.key_to_path(path)).await?;
    Ok(())
  }

  async fn list(&self, path: &str) -> Result<Vec<Entry>, SyncError> {
    let mut dir = fs::read_dir(self.key_to_path(path))
      .await
      .map_err(|e| not_found(path, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
      let kind = if entry.file_type().await?.is_dir() {
        EntryKind::Dir
      } else {
        EntryKind::File
      };
      entries.push(Entry {
        name: entry.file_name().to_string_lossy().into_owned(),
        kind,
      });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;

  fn body(data: &'static [u8]) -> ByteStream {
    Box::pin(futures::stream::once(async move {
      Ok::<_, SyncError>(Bytes::from_static(data))
    }))
  }

  #[tokio::test]
  async fn test_put_get_head() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());

    assert!(!store.head("job/out/a.txt").await.unwrap());
    store.put("job/out/a.txt", body(b"hello")).await.unwrap();
    assert!(store.head("job/out/a.txt").await.unwrap());

    let mut stream = store.get("job/out/a.txt").await.unwrap();
    let mut read = Vec::new();
    while let Some(chunk) = stream.next().await {
      read.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(read, b"hello");
  }

  #[tokio::test]
  async fn test_get_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    assert!(matches!(
      store.get("nope").await,
      Err(SyncError::NotFound { .. })
    ));
  }

  #[tokio::test]
  async fn test_list_marks_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    store.put("root/b.txt", body(b"b")).await.unwrap();
    store.mkcol("root/sub/").await.unwrap();
    store.mkcol("root/sub/").await.unwrap();

    let entries = store.list("root/").await.unwrap();
    assert_eq!(
      entries,
      vec![
        Entry {
          name: "b.txt".into(),
          kind: EntryKind::File
        },
        Entry {
          name: "sub".into(),
          kind: EntryKind::Dir
        },
      ]
    );
  }
}
