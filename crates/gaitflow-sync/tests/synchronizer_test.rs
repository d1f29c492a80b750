use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gaitflow_sync::{
  ByteStream, DataSynchronizer, Entry, EntryKind, FsStore, RemoteStore, SyncError,
};

fn synchronizer(remote_root: &Path) -> DataSynchronizer {
  DataSynchronizer::new(Arc::new(FsStore::new(remote_root)))
}

#[tokio::test]
async fn test_file_round_trip_creates_parent() {
  let remote = tempfile::tempdir().unwrap();
  let local = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());

  let source = local.path().join("signal.json");
  tokio::fs::write(&source, b"{\"frames\":[]}").await.unwrap();
  sync.upload(&source, "results/job-1/out/signal.json").await.unwrap();
  assert!(sync.exists("results/job-1/out/signal.json").await);

  let target = local.path().join("deep/nested/copy.json");
  sync
    .download("results/job-1/out/signal.json", &target)
    .await
    .unwrap();
  assert_eq!(tokio::fs::read(&target).await.unwrap(), b"{\"frames\":[]}");
  assert!(!local.path().join("deep/nested/copy.json.part").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_nothing_behind() {
  let remote = tempfile::tempdir().unwrap();
  let local = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());

  let target = local.path().join("out/missing.csv");
  let err = sync.download("results/none.csv", &target).await.unwrap_err();
  assert!(matches!(err, SyncError::NotFound { .. }));
  assert!(!target.exists());
  assert!(!local.path().join("out/missing.csv.part").exists());
}

#[tokio::test]
async fn test_folder_round_trip() {
  let remote = tempfile::tempdir().unwrap();
  let local = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());

  let source = local.path().join("upload");
  tokio::fs::create_dir_all(source.join("3d/frames")).await.unwrap();
  tokio::fs::write(source.join("a.json"), b"a").await.unwrap();
  tokio::fs::write(source.join("3d/b.npy"), b"b").await.unwrap();
  tokio::fs::write(source.join("3d/frames/c.json"), b"c").await.unwrap();
  tokio::fs::create_dir_all(source.join("empty")).await.unwrap();

  let uploaded = sync.upload_folder(&source, "results/job-1/out/").await.unwrap();
  assert_eq!(uploaded, 3);
  assert!(remote.path().join("results/job-1/out/empty").is_dir());

  let mirror = local.path().join("mirror");
  let downloaded = sync
    .download_folder("results/job-1/out/", &mirror)
    .await
    .unwrap();
  assert_eq!(downloaded, 3);
  assert_eq!(tokio::fs::read(mirror.join("a.json")).await.unwrap(), b"a");
  assert_eq!(tokio::fs::read(mirror.join("3d/b.npy")).await.unwrap(), b"b");
  assert_eq!(
    tokio::fs::read(mirror.join("3d/frames/c.json")).await.unwrap(),
    b"c"
  );
}

#[tokio::test]
async fn test_folder_paths_need_trailing_slash() {
  let remote = tempfile::tempdir().unwrap();
  let local = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());

  let err = sync
    .download_folder("results/job-1/out", local.path())
    .await
    .unwrap_err();
  assert!(matches!(err, SyncError::NotAFolder { .. }));

  let err = sync
    .upload_folder(local.path(), "results/job-1/out")
    .await
    .unwrap_err();
  assert!(matches!(err, SyncError::NotAFolder { .. }));
}

#[tokio::test]
async fn test_exists_is_false_for_missing_and_unreachable() {
  let remote = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());
  assert!(!sync.exists("results/nothing").await);

  let unreachable = DataSynchronizer::new(Arc::new(
    gaitflow_sync::WebDavStore::new("http://127.0.0.1:1").unwrap(),
  ));
  assert!(!unreachable.exists("results/anything").await);
}

#[tokio::test]
async fn test_read_returns_file_contents() {
  let remote = tempfile::tempdir().unwrap();
  let sync = synchronizer(remote.path());
  tokio::fs::create_dir_all(remote.path().join("results/job-1/out"))
    .await
    .unwrap();
  tokio::fs::write(remote.path().join("results/job-1/out/walk-tt.json"), b"{}")
    .await
    .unwrap();

  assert_eq!(sync.read("results/job-1/out/walk-tt.json").await.unwrap(), b"{}");
  let err = sync.read("results/job-1/out/none.json").await.unwrap_err();
  assert!(matches!(err, SyncError::NotFound { .. }));
}

/// Serves files from disk but lists whatever names it was given.
struct ListingStore {
  inner: FsStore,
  names: Vec<&'static str>,
}

#[async_trait]
impl RemoteStore for ListingStore {
  async fn head(&self, path: &str) -> Result<bool, SyncError> {
    self.inner.head(path).await
  }

  async fn get(&self, path: &str) -> Result<ByteStream, SyncError> {
    self.inner.get(path).await
  }

  async fn put(&self, path: &str, data: ByteStream) -> Result<(), SyncError> {
    self.inner.put(path, data).await
  }

  async fn mkcol(&self, path: &str) -> Result<(), SyncError> {
    self.inner.mkcol(path).await
  }

  async fn list(&self, _path: &str) -> Result<Vec<Entry>, SyncError> {
    Ok(
      self
        .names
        .iter()
        .map(|name| Entry {
          name: name.to_string(),
          kind: EntryKind::File,
        })
        .collect(),
    )
  }
}

#[tokio::test]
async fn test_folder_download_rejects_escaping_names() {
  let remote = tempfile::tempdir().unwrap();
  let local = tempfile::tempdir().unwrap();
  tokio::fs::create_dir_all(remote.path().join("results/job-1"))
    .await
    .unwrap();
  tokio::fs::write(remote.path().join("results/job-1/secret.txt"), b"s")
    .await
    .unwrap();

  let sync = DataSynchronizer::new(Arc::new(ListingStore {
    inner: FsStore::new(remote.path()),
    names: vec!["../secret.txt"],
  }));
  let scratch = local.path().join("scratch/out");
  let err = sync
    .download_folder("results/job-1/out/", &scratch)
    .await
    .unwrap_err();
  assert!(matches!(err, SyncError::Protocol { .. }), "{err}");
  assert!(!local.path().join("scratch/secret.txt").exists());
}
