//! Local artifact store.
//!
//! Artifacts are content-addressed by their target's content hash and
//! partitioned by cache category.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── binaries/
//! │   ├── .staging/              # in-flight writes, renamed into place
//! │   └── <hash>/
//! │       ├── artifact
//! │       └── metadata.json
//! └── selective-tests/
//!     └── ...
//! ```
//!
//! Category directories are created on first write. An entry only becomes
//! visible through an atomic rename of a fully written staging directory.

pub mod gc;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::CacheCategory;
use crate::consts::{ARTIFACT_FILENAME, METADATA_FILENAME, STAGING_DIRNAME};
use crate::util::hash::{DigestError, hash_file};

pub use gc::{EvictedEntry, EvictionPolicy, EvictionReport, evict};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid metadata at {path}: {source}")]
  Metadata {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Digest(#[from] DigestError),

  #[error("invalid cache key '{0}'")]
  InvalidKey(String),
}

/// Keys become directory names, so only plain names are accepted.
fn validate_key(hash: &str) -> Result<(), StoreError> {
  let valid = !hash.is_empty()
    && !hash.starts_with('.')
    && hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
  if valid {
    Ok(())
  } else {
    Err(StoreError::InvalidKey(hash.to_string()))
  }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// Integrity sidecar written next to every artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
  pub name: String,
  pub hash: String,
  pub size: u64,
  pub sha256: String,
  /// Seconds since the Unix epoch.
  pub created_at: u64,
  /// Seconds since the Unix epoch. Updated on every successful fetch.
  pub accessed_at: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build_duration_ms: Option<u64>,
}

impl ArtifactMetadata {
  pub fn build_duration(&self) -> Option<Duration> {
    self.build_duration_ms.map(Duration::from_millis)
  }
}

/// An artifact committed to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
  pub category: CacheCategory,
  /// Path of the artifact file inside the store.
  pub path: PathBuf,
  pub metadata: ArtifactMetadata,
}

/// Disk-backed store of build artifacts.
///
/// Implementations are blocking; async callers run them on the blocking pool.
pub trait LocalStore: Send + Sync {
  fn exists(&self, category: CacheCategory, hash: &str) -> Result<bool, StoreError>;

  /// Look up an artifact, verifying its size and checksum. A corrupted entry is
  /// removed and reported as absent.
  fn fetch(&self, category: CacheCategory, hash: &str) -> Result<Option<StoredArtifact>, StoreError>;

  /// Copy `source` into the store under `hash`.
  fn store(
    &self,
    category: CacheCategory,
    name: &str,
    hash: &str,
    source: &Path,
    build_duration: Option<Duration>,
  ) -> Result<StoredArtifact, StoreError>;

  /// A temporary file on the same filesystem as the store, removed on drop.
  fn staging_file(&self, category: CacheCategory) -> Result<NamedTempFile, StoreError>;
}

#[derive(Debug, Clone)]
pub struct DiskStore {
  root: PathBuf,
}

impl DiskStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn category_dir(&self, category: CacheCategory) -> PathBuf {
    self.root.join(category.as_str())
  }

  pub fn entry_dir(&self, category: CacheCategory, hash: &str) -> PathBuf {
    self.category_dir(category).join(hash)
  }

  fn staging_dir(&self, category: CacheCategory) -> Result<PathBuf, StoreError> {
    let dir = self.category_dir(category).join(STAGING_DIRNAME);
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    Ok(dir)
  }

  /// Read and verify an entry without touching its access time.
  fn verified(&self, category: CacheCategory, hash: &str) -> Result<Option<StoredArtifact>, StoreError> {
    validate_key(hash)?;
    let dir = self.entry_dir(category, hash);
    let metadata_path = dir.join(METADATA_FILENAME);
    let artifact_path = dir.join(ARTIFACT_FILENAME);

    if !metadata_path.is_file() || !artifact_path.is_file() {
      return Ok(None);
    }

    let metadata = match read_metadata(&metadata_path) {
      Ok(metadata) => metadata,
      // Left in place; the next `store` of this hash replaces it.
      Err(StoreError::Metadata { .. }) => {
        warn!(category = %category, hash, "skipping entry with unreadable metadata");
        return Ok(None);
      }
      Err(e) => return Err(e),
    };

    let size = fs::metadata(&artifact_path).map_err(io_err(&artifact_path))?.len();
    if size != metadata.size || hash_file(&artifact_path)? != metadata.sha256 {
      warn!(category = %category, hash, "discarding corrupted cache entry");
      remove_entry(&dir)?;
      return Ok(None);
    }

    Ok(Some(StoredArtifact {
      category,
      path: artifact_path,
      metadata,
    }))
  }
}

impl LocalStore for DiskStore {
  fn exists(&self, category: CacheCategory, hash: &str) -> Result<bool, StoreError> {
    validate_key(hash)?;
    let dir = self.entry_dir(category, hash);
    Ok(dir.join(ARTIFACT_FILENAME).is_file() && dir.join(METADATA_FILENAME).is_file())
  }

  fn fetch(&self, category: CacheCategory, hash: &str) -> Result<Option<StoredArtifact>, StoreError> {
    let Some(mut artifact) = self.verified(category, hash)? else {
      debug!(category = %category, hash, "local cache miss");
      return Ok(None);
    };

    artifact.metadata.accessed_at = unix_now();
    let metadata_path = self.entry_dir(category, hash).join(METADATA_FILENAME);
    if let Err(e) = write_metadata(&metadata_path, &artifact.metadata) {
      warn!(hash, error = %e, "failed to update access time");
    }

    debug!(category = %category, hash, "local cache hit");
    Ok(Some(artifact))
  }

  fn store(
    &self,
    category: CacheCategory,
    name: &str,
    hash: &str,
    source: &Path,
    build_duration: Option<Duration>,
  ) -> Result<StoredArtifact, StoreError> {
    if let Some(existing) = self.verified(category, hash)? {
      debug!(category = %category, hash, "artifact already stored");
      return Ok(existing);
    }

    let staging_root = self.staging_dir(category)?;
    let staged = tempfile::Builder::new()
      .prefix("entry-")
      .tempdir_in(&staging_root)
      .map_err(io_err(&staging_root))?;

    let artifact_path = staged.path().join(ARTIFACT_FILENAME);
    let size = fs::copy(source, &artifact_path).map_err(io_err(source))?;
    let now = unix_now();
    let metadata = ArtifactMetadata {
      name: name.to_string(),
      hash: hash.to_string(),
      size,
      sha256: hash_file(&artifact_path)?,
      created_at: now,
      accessed_at: now,
      build_duration_ms: build_duration.map(|d| d.as_millis() as u64),
    };
    write_metadata(&staged.path().join(METADATA_FILENAME), &metadata)?;

    let final_dir = self.entry_dir(category, hash);
    // A leftover partial entry would block the rename.
    if final_dir.exists() {
      remove_entry(&final_dir)?;
    }

    if let Err(e) = fs::rename(staged.path(), &final_dir) {
      // Lost a race with a concurrent writer of the same hash.
      if let Some(existing) = self.verified(category, hash)? {
        return Ok(existing);
      }
      return Err(StoreError::Io {
        path: final_dir,
        source: e,
      });
    }

    debug!(category = %category, hash, size, "stored artifact");
    Ok(StoredArtifact {
      category,
      path: final_dir.join(ARTIFACT_FILENAME),
      metadata,
    })
  }

  fn staging_file(&self, category: CacheCategory) -> Result<NamedTempFile, StoreError> {
    let dir = self.staging_dir(category)?;
    tempfile::Builder::new()
      .prefix("download-")
      .tempfile_in(&dir)
      .map_err(io_err(&dir))
  }
}

pub(crate) fn read_metadata(path: &Path) -> Result<ArtifactMetadata, StoreError> {
  let content = fs::read_to_string(path).map_err(io_err(path))?;
  serde_json::from_str(&content).map_err(|source| StoreError::Metadata {
    path: path.to_path_buf(),
    source,
  })
}

/// Replace `path` through a rename so readers never see a partial file.
fn write_metadata(path: &Path, metadata: &ArtifactMetadata) -> Result<(), StoreError> {
  let json = serde_json::to_vec_pretty(metadata).map_err(|source| StoreError::Metadata {
    path: path.to_path_buf(),
    source,
  })?;
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  let mut file = tempfile::Builder::new()
    .prefix(".metadata-")
    .tempfile_in(dir)
    .map_err(io_err(dir))?;
  file.write_all(&json).map_err(io_err(file.path()))?;
  file.persist(path).map_err(|e| StoreError::Io {
    path: path.to_path_buf(),
    source: e.error,
  })?;
  Ok(())
}

pub(crate) fn remove_entry(dir: &Path) -> Result<(), StoreError> {
  match fs::remove_dir_all(dir) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(StoreError::Io {
      path: dir.to_path_buf(),
      source: e,
    }),
  }
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}
