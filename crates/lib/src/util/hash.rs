//! SHA-256 digest helpers.
//!
//! All digests are full 64-character lowercase hex strings. Paths are hashed
//! by content only: timestamps and permissions never contribute.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DigestError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk directory {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

impl DigestError {
  pub fn path(&self) -> &Path {
    match self {
      DigestError::Read { path, .. } | DigestError::Walk { path, .. } => path,
    }
  }
}

pub fn hash_bytes(data: &[u8]) -> String {
  hex::encode(Sha256::digest(data))
}

/// Hash newline-terminated lines in the given order.
pub fn hash_lines<I, S>(lines: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut hasher = Sha256::new();
  for line in lines {
    hasher.update(line.as_ref().as_bytes());
    hasher.update(b"\n");
  }
  hex::encode(hasher.finalize())
}

/// Hash a file's contents, streaming.
pub fn hash_file(path: &Path) -> Result<String, DigestError> {
  let read_err = |source| DigestError::Read {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Hash a file, a directory or a symlink.
///
/// Directories are walked in file-name order; each entry contributes its
/// relative path and either its content hash (files) or its link target
/// (symlinks). Symlinks are not followed.
pub fn hash_path(path: &Path) -> Result<String, DigestError> {
  let meta = fs::symlink_metadata(path).map_err(|source| DigestError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  if meta.file_type().is_symlink() {
    let target = fs::read_link(path).map_err(|source| DigestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    return Ok(hash_bytes(target.to_string_lossy().as_bytes()));
  }
  if meta.is_file() {
    return hash_file(path);
  }

  let mut entries: Vec<String> = Vec::new();
  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|source| DigestError::Walk {
      path: path.to_path_buf(),
      source,
    })?;
    let entry_path = entry.path();
    let rel = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    if file_type.is_file() {
      entries.push(format!("F:{}:{}", rel, hash_file(entry_path)?));
    } else if file_type.is_dir() {
      entries.push(format!("D:{}", rel));
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|source| DigestError::Read {
        path: entry_path.to_path_buf(),
        source,
      })?;
      entries.push(format!("L:{}:{}", rel, hash_bytes(target.to_string_lossy().as_bytes())));
    }
  }

  entries.sort();
  Ok(hash_lines(entries))
}
