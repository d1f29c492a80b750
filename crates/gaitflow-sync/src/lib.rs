//! gaitflow Data Synchronizer
//!
//! Stages exchange artifacts through a remote store that acts as the system
//! of record; each stage keeps a private local mirror while it runs.
//!
//! The [`RemoteStore`] trait is the backend layer (WebDAV, local filesystem).
//! [`DataSynchronizer`] builds single-file and whole-folder transfers on top
//! of it. Remote paths are `/`-separated and relative to the store root;
//! folder paths end with `/`.

mod error;
mod fs;
mod synchronizer;
mod webdav;

pub use error::SyncError;
pub use fs::FsStore;
pub use synchronizer::DataSynchronizer;
pub use webdav::WebDavStore;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// A boxed stream of bytes for artifact contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SyncError>> + Send>>;

/// Kind of a listed remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  File,
  Dir,
}

/// One entry of a single-level folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
  pub name: String,
  pub kind: EntryKind,
}

impl Entry {
  pub fn is_dir(&self) -> bool {
    self.kind == EntryKind::Dir
  }
}

/// Remote artifact store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Metadata lookup. `Ok(false)` when the path does not exist.
  async fn head(&self, path: &str) -> Result<bool, SyncError>;

  async fn get(&self, path: &str) -> Result<ByteStream, SyncError>;

  async fn put(&self, path: &str, data: ByteStream) -> Result<(), SyncError>;

  /// Create a collection. Creating one that already exists is not an error.
  async fn mkcol(&self, path: &str) -> Result<(), SyncError>;

  /// Entries directly under `path`. Recursion is left to the caller.
  async fn list(&self, path: &str) -> Result<Vec<Entry>, SyncError>;
}

pub(crate) fn require_folder(path: &str) -> Result<(), SyncError> {
  if path.ends_with('/') {
    Ok(())
  } else {
    Err(SyncError::NotAFolder {
      path: path.to_string(),
    })
  }
}
