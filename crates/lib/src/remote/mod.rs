//! Remote artifact cache.
//!
//! The [`RemoteCache`] trait is the seam the coordinator talks to;
//! [`HttpCacheClient`] implements it against the cache HTTP service.

pub mod client;
pub mod multipart;
pub mod signature;
pub mod types;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use client::HttpCacheClient;
pub use multipart::MultipartSession;
pub use signature::{SignatureError, SignatureVerifier, Verification};
pub use types::CacheKey;

#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("request to {url} failed: {source}")]
  Network {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{url} returned HTTP {status}")]
  Http { url: String, status: u16 },

  #[error("artifact {hash} not found")]
  NotFound { hash: String },

  #[error(transparent)]
  Signature(#[from] SignatureError),

  #[error("invalid response from {url}: {message}")]
  InvalidResponse { url: String, message: String },

  #[error("invalid cache URL '{0}'")]
  InvalidUrl(String),

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot complete upload: part {0} was never uploaded")]
  MissingPart(u32),

  #[error("uploaded size {actual} does not match artifact size {expected}")]
  SizeMismatch { expected: u64, actual: u64 },

  #[error("upload task failed: {0}")]
  Task(String),
}

impl RemoteError {
  /// Whether retrying the same request may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      RemoteError::Network { source, .. } => source.is_connect() || source.is_timeout() || source.is_request(),
      RemoteError::Http { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }
}

/// Remote tier of the cache.
pub trait RemoteCache: Send + Sync {
  fn exists(&self, key: &CacheKey) -> impl Future<Output = Result<bool, RemoteError>> + Send;

  /// Download an artifact to `destination`, returning the number of bytes written.
  fn fetch(&self, key: &CacheKey, destination: &Path) -> impl Future<Output = Result<u64, RemoteError>> + Send;

  fn store(&self, key: &CacheKey, source: &Path) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
