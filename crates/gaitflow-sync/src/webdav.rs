use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::{ByteStream, Entry, EntryKind, RemoteStore, SyncError};

/// WebDAV backend.
///
/// Folder listings use the `GET {dir}?json` extension served by common
/// static WebDAV servers, which answers with
/// `{ "paths": [{ "name": "...", "path_type": "Dir" | "File" | ... }] }`.
pub struct WebDavStore {
  client: Client,
  base: Url,
  user: Option<String>,
  password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
  paths: Vec<ListedPath>,
}

#[derive(Debug, Deserialize)]
struct ListedPath {
  name: String,
  path_type: String,
}

impl WebDavStore {
  pub fn new(base_url: &str) -> Result<Self, SyncError> {
    let base = Url::parse(base_url).map_err(|e| SyncError::InvalidUrl {
      url: base_url.to_string(),
      message: e.to_string(),
    })?;
    Ok(Self {
      client: Client::new(),
      base,
      user: None,
      password: None,
    })
  }

  pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
    self.user = Some(user.into());
    self.password = password;
    self
  }

  fn url_for(&self, path: &str) -> Result<Url, SyncError> {
    let joined = format!(
      "{}/{}",
      self.base.as_str().trim_end_matches('/'),
      path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| SyncError::InvalidUrl {
      url: joined,
      message: e.to_string(),
    })
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let request = self.client.request(method, url);
    match &self.user {
      Some(user) => request.basic_auth(user, self.password.as_ref()),
      None => request,
    }
  }
}

fn unexpected(method: &Method, path: &str, status: StatusCode) -> SyncError {
  SyncError::UnexpectedStatus {
    method: method.to_string(),
    path: path.to_string(),
    status: status.as_u16(),
  }
}

pub(crate) fn parse_listing(path: &str, body: &[u8]) -> Result<Vec<Entry>, SyncError> {
  let listing: Listing = serde_json::from_slice(body).map_err(|e| SyncError::Protocol {
    path: path.to_string(),
    message: e.to_string(),
  })?;

  Ok(
    listing
      .paths
      .into_iter()
      .map(|p| Entry {
        kind: match p.path_type.as_str() {
          "Dir" | "SymlinkDir" => EntryKind::Dir,
          _ => EntryKind::File,
        },
        name: p.name,
      })
      .collect(),
  )
}

#[async_trait]
impl RemoteStore for WebDavStore {
  async fn head(&self, path: &str) -> Result<bool, SyncError> {
    let url = self.url_for(path.trim_end_matches('/'))?;
    let response = self.request(Method::HEAD, url).send().await?;
    match response.status() {
      StatusCode::OK => Ok(true),
      StatusCode::NOT_FOUND => Ok(false),
      status => Err(unexpected(&Method::HEAD, path, status)),
    }
  }

  async fn get(&self, path: &str) -> Result<ByteStream, SyncError> {
    let url = self.url_for(path)?;
    let response = self.request(Method::GET, url).send().await?;
    match response.status() {
      status if status.is_success() => {
        let stream = response.bytes_stream().map(|r| r.map_err(SyncError::Http));
        Ok(Box::pin(stream))
      }
      StatusCode::NOT_FOUND => Err(SyncError::NotFound {
        path: path.to_string(),
      }),
      status => Err(unexpected(&Method::GET, path, status)),
    }
  }

  async fn put(&self, path: &str, data: ByteStream) -> Result<(), SyncError> {
    let url = self.url_for(path)?;
    let response = self
      .request(Method::PUT, url)
      .body(Body::wrap_stream(data))
      .send()
      .await?;
    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      Err(unexpected(&Method::PUT, path, status))
    }
  }

  async fn mkcol(&self, path: &str) -> Result<(), SyncError> {
    let method = Method::from_bytes(b"MKCOL").map_err(|e| SyncError::Protocol {
      path: path.to_string(),
      message: e.to_string(),
    })?;
    let url = self.url_for(path)?;
    let response = self.request(method.clone(), url).send().await?;
    match response.status() {
      // 405: the collection already exists
      status if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED => Ok(()),
      status => Err(unexpected(&method, path, status)),
    }
  }

  async fn list(&self, path: &str) -> Result<Vec<Entry>, SyncError> {
    let mut url = self.url_for(path)?;
    url.set_query(Some("json"));
    let response = self.request(Method::GET, url).send().await?;
    match response.status() {
      status if status.is_success() => parse_listing(path, &response.bytes().await?),
      StatusCode::NOT_FOUND => Err(SyncError::NotFound {
        path: path.to_string(),
      }),
      status => Err(unexpected(&Method::GET, path, status)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_url_for_joins_without_double_slash() {
    let store = WebDavStore::new("http://dav.local:8080/").unwrap();
    let url = store.url_for("/results/job-1/out/a.csv").unwrap();
    assert_eq!(url.as_str(), "http://dav.local:8080/results/job-1/out/a.csv");

    let folder = store.url_for("results/job-1/out/").unwrap();
    assert_eq!(folder.as_str(), "http://dav.local:8080/results/job-1/out/");
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(matches!(
      WebDavStore::new("not a url"),
      Err(SyncError::InvalidUrl { .. })
    ));
  }

  #[test]
  fn test_parse_listing() {
    let body = br#"{"paths":[
      {"name":"2d","path_type":"Dir","mtime":1,"size":0},
      {"name":"trial.npz","path_type":"File","mtime":1,"size":10},
      {"name":"link","path_type":"SymlinkDir"}
    ]}"#;
    let entries = parse_listing("out/", body).unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_dir());
    assert_eq!(entries[1].name, "trial.npz");
    assert_eq!(entries[1].kind, EntryKind::File);
    assert!(entries[2].is_dir());
  }

  #[test]
  fn test_parse_listing_rejects_html() {
    let err = parse_listing("out/", b"<html></html>").unwrap_err();
    assert!(matches!(err, SyncError::Protocol { .. }));
  }
}
