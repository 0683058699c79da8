//! Multipart upload of large artifacts.
//!
//! An upload is split into fixed-size parts numbered from 1. Parts go up
//! concurrently; the ETag of each stored part is recorded in a
//! [`MultipartSession`] so later rounds only resend what is missing.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::RemoteError;
use super::client::HttpCacheClient;
use super::types::{ArtifactSize, CacheKey, CompleteMultipart, CompletedPart, MultipartStart, UploadUrl};
use crate::config::MultipartConfig;

/// Progress of one multipart upload.
#[derive(Debug, Clone)]
pub struct MultipartSession {
  pub upload_id: String,
  part_size: u64,
  total_size: u64,
  completed: BTreeMap<u32, String>,
}

impl MultipartSession {
  pub fn new(upload_id: impl Into<String>, part_size: u64, total_size: u64) -> Self {
    Self {
      upload_id: upload_id.into(),
      part_size: part_size.max(1),
      total_size,
      completed: BTreeMap::new(),
    }
  }

  /// Number of parts. An empty artifact is still one (empty) part.
  pub fn part_count(&self) -> u32 {
    self.total_size.div_ceil(self.part_size).max(1) as u32
  }

  /// Byte offset and length of `part_number`.
  pub fn part_range(&self, part_number: u32) -> (u64, u64) {
    let offset = u64::from(part_number - 1) * self.part_size;
    let len = self.part_size.min(self.total_size.saturating_sub(offset));
    (offset, len)
  }

  pub fn record(&mut self, part_number: u32, etag: impl Into<String>) {
    self.completed.insert(part_number, etag.into());
  }

  pub fn missing_parts(&self) -> Vec<u32> {
    (1..=self.part_count())
      .filter(|n| !self.completed.contains_key(n))
      .collect()
  }

  pub fn is_complete(&self) -> bool {
    self.missing_parts().is_empty()
  }

  /// Parts in ascending order, ready for the completion request.
  pub fn completed_parts(&self) -> Result<Vec<CompletedPart>, RemoteError> {
    if let Some(missing) = self.missing_parts().first() {
      return Err(RemoteError::MissingPart(*missing));
    }
    Ok(
      self
        .completed
        .iter()
        .map(|(part_number, etag)| CompletedPart {
          part_number: *part_number,
          etag: etag.clone(),
        })
        .collect(),
    )
  }
}

/// Upload `source` in parts. If the service reports a different size after
/// completion, the whole upload is restarted once.
pub(crate) async fn upload(
  client: &HttpCacheClient,
  key: &CacheKey,
  source: &Path,
  size: u64,
) -> Result<(), RemoteError> {
  let config = client.multipart_config().clone();
  let mut restarted = false;

  loop {
    let mut session = start(client, key, size, config.part_size).await?;
    debug!(
      upload_id = %session.upload_id,
      parts = session.part_count(),
      "started multipart upload"
    );

    upload_parts(client, key, source, &mut session, &config).await?;
    complete(client, key, &session).await?;

    let uploaded = remote_size(client, key).await?;
    if uploaded == size {
      return Ok(());
    }
    if restarted {
      return Err(RemoteError::SizeMismatch {
        expected: size,
        actual: uploaded,
      });
    }

    warn!(
      hash = %key.hash,
      expected = size,
      actual = uploaded,
      "uploaded size mismatch, restarting upload"
    );
    restarted = true;
  }
}

async fn start(client: &HttpCacheClient, key: &CacheKey, size: u64, part_size: u64) -> Result<MultipartSession, RemoteError> {
  let url = client.api_url("/api/cache/multipart/start", key, &[])?;
  let response = client
    .send(client.api_request(Method::POST, url.clone()), url.as_str())
    .await?;
  let started: MultipartStart = client.json(response).await?;
  Ok(MultipartSession::new(started.upload_id, part_size, size))
}

/// Upload every missing part, in rounds. Transient part failures leave the
/// part missing for the next round; anything else aborts the upload.
async fn upload_parts(
  client: &HttpCacheClient,
  key: &CacheKey,
  source: &Path,
  session: &mut MultipartSession,
  config: &MultipartConfig,
) -> Result<(), RemoteError> {
  let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

  for round in 1..=config.part_attempts.max(1) {
    if session.is_complete() {
      break;
    }
    let missing = session.missing_parts();
    if round > 1 {
      debug!(round, parts = missing.len(), "retrying failed parts");
    }

    let mut join_set = JoinSet::new();
    for part_number in missing {
      let (offset, len) = session.part_range(part_number);
      let part = Part {
        client: client.clone(),
        key: key.clone(),
        source: source.to_path_buf(),
        upload_id: session.upload_id.clone(),
        part_number,
        offset,
        len,
      };
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| RemoteError::Task(e.to_string()))?;
        part.upload().await
      });
    }

    while let Some(joined) = join_set.join_next().await {
      match joined.map_err(|e| RemoteError::Task(e.to_string()))? {
        Ok((part_number, etag)) => session.record(part_number, etag),
        Err(e) if e.is_transient() => {
          warn!(upload_id = %session.upload_id, error = %e, "part upload failed");
        }
        Err(e) => {
          join_set.abort_all();
          return Err(e);
        }
      }
    }
  }

  Ok(())
}

async fn complete(client: &HttpCacheClient, key: &CacheKey, session: &MultipartSession) -> Result<(), RemoteError> {
  let body = CompleteMultipart {
    parts: session.completed_parts()?,
  };
  let url = client.api_url(
    "/api/cache/multipart/complete",
    key,
    &[("upload_id", session.upload_id.clone())],
  )?;
  let response = client
    .send(client.api_request(Method::POST, url.clone()).json(&body), url.as_str())
    .await?;
  if !response.status().is_success() {
    return Err(RemoteError::Http {
      url: url.to_string(),
      status: response.status().as_u16(),
    });
  }
  Ok(())
}

async fn remote_size(client: &HttpCacheClient, key: &CacheKey) -> Result<u64, RemoteError> {
  let url = client.api_url("/api/cache/size", key, &[])?;
  let response = client
    .send(client.api_request(Method::GET, url.clone()), url.as_str())
    .await?;
  let size: ArtifactSize = client.json(response).await?;
  Ok(size.size)
}

/// One part upload, owned so it can run on its own task.
struct Part {
  client: HttpCacheClient,
  key: CacheKey,
  source: PathBuf,
  upload_id: String,
  part_number: u32,
  offset: u64,
  len: u64,
}

impl Part {
  async fn upload(self) -> Result<(u32, String), RemoteError> {
    let body = self.read().await?;

    let url = self.client.api_url(
      "/api/cache/multipart/generate-url",
      &self.key,
      &[
        ("upload_id", self.upload_id.clone()),
        ("part_number", self.part_number.to_string()),
        ("content_length", self.len.to_string()),
      ],
    )?;
    let response = self
      .client
      .send(self.client.api_request(Method::POST, url.clone()), url.as_str())
      .await?;
    let target: UploadUrl = self.client.json(response).await?;

    let request = self
      .client
      .storage_request(Method::PUT, &target.url)?
      .header(CONTENT_LENGTH, self.len)
      .body(body);
    let response = self.client.send(request, &target.url).await?;
    if !response.status().is_success() {
      return Err(RemoteError::Http {
        url: target.url,
        status: response.status().as_u16(),
      });
    }

    let etag = response
      .headers()
      .get(ETAG)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| RemoteError::InvalidResponse {
        url: target.url.clone(),
        message: format!("part {} has no ETag", self.part_number),
      })?;

    Ok((self.part_number, etag.to_string()))
  }

  async fn read(&self) -> Result<Vec<u8>, RemoteError> {
    let io_err = |e| RemoteError::Io {
      path: self.source.clone(),
      source: e,
    };

    let mut file = tokio::fs::File::open(&self.source).await.map_err(io_err)?;
    file.seek(SeekFrom::Start(self.offset)).await.map_err(io_err)?;
    let mut buf = vec![0u8; self.len as usize];
    file.read_exact(&mut buf).await.map_err(io_err)?;
    Ok(buf)
  }
}
