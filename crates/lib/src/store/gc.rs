//! Eviction of local cache entries.
//!
//! Runs as a separate maintenance pass, never during resolution. Entries older
//! than `max_age` go first, then the least recently accessed entries until the
//! store fits in `max_size`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{StoreError, read_metadata, remove_entry, unix_now};
use crate::consts::{METADATA_FILENAME, STAGING_DIRNAME};

#[derive(Debug, Clone, Default)]
pub struct EvictionPolicy {
  pub max_age: Option<Duration>,
  /// Upper bound on the total size of all entries, in bytes.
  pub max_size: Option<u64>,
  pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictedEntry {
  pub category: String,
  pub hash: String,
  pub size: u64,
  pub path: PathBuf,
}

#[derive(Debug, Default, Serialize)]
pub struct EvictionReport {
  pub scanned: usize,
  pub evicted: Vec<EvictedEntry>,
  pub bytes_freed: u64,
  pub bytes_remaining: u64,
  pub dry_run: bool,
}

struct Entry {
  category: String,
  hash: String,
  path: PathBuf,
  size: u64,
  /// `None` when the metadata is unreadable; such entries are always evicted.
  accessed_at: Option<u64>,
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

fn scan(root: &Path) -> Result<Vec<Entry>, StoreError> {
  let mut entries = Vec::new();
  if !root.is_dir() {
    return Ok(entries);
  }

  let categories = fs::read_dir(root).map_err(|source| StoreError::Io {
    path: root.to_path_buf(),
    source,
  })?;

  for category in categories.flatten() {
    let category_path = category.path();
    let Some(category_name) = category_path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
      continue;
    };
    if !category_path.is_dir() || category_name.starts_with('.') {
      continue;
    }

    let Ok(items) = fs::read_dir(&category_path) else {
      warn!(path = %category_path.display(), "skipping unreadable category");
      continue;
    };

    for item in items.flatten() {
      let path = item.path();
      let Some(hash) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
        continue;
      };
      if !path.is_dir() || hash == STAGING_DIRNAME {
        continue;
      }

      let accessed_at = read_metadata(&path.join(METADATA_FILENAME))
        .map(|m| m.accessed_at)
        .ok();
      entries.push(Entry {
        category: category_name.clone(),
        hash,
        size: dir_size(&path),
        path,
        accessed_at,
      });
    }
  }

  Ok(entries)
}

/// Evict entries under `root` according to `policy`.
pub fn evict(root: &Path, policy: &EvictionPolicy) -> Result<EvictionReport, StoreError> {
  let mut entries = scan(root)?;
  let mut report = EvictionReport {
    scanned: entries.len(),
    dry_run: policy.dry_run,
    ..Default::default()
  };

  // Oldest access first; unreadable entries sort before everything else.
  entries.sort_by(|a, b| a.accessed_at.cmp(&b.accessed_at).then_with(|| a.hash.cmp(&b.hash)));

  let now = unix_now();
  let cutoff = policy.max_age.map(|age| now.saturating_sub(age.as_secs()));
  let mut total: u64 = entries.iter().map(|e| e.size).sum();
  let mut kept = Vec::new();

  for entry in entries {
    let expired = match (entry.accessed_at, cutoff) {
      (None, _) => true,
      (Some(accessed), Some(cutoff)) => accessed < cutoff,
      (Some(_), None) => false,
    };
    if expired {
      debug!(hash = %entry.hash, category = %entry.category, "evicting expired entry");
      total -= entry.size;
      remove(entry, policy.dry_run, &mut report)?;
    } else {
      kept.push(entry);
    }
  }

  if let Some(max_size) = policy.max_size {
    for entry in kept {
      if total <= max_size {
        break;
      }
      debug!(hash = %entry.hash, category = %entry.category, "evicting least recently used entry");
      total -= entry.size;
      remove(entry, policy.dry_run, &mut report)?;
    }
  }

  report.bytes_remaining = total;
  info!(
    scanned = report.scanned,
    evicted = report.evicted.len(),
    bytes_freed = report.bytes_freed,
    dry_run = policy.dry_run,
    "cache eviction complete"
  );
  Ok(report)
}

fn remove(entry: Entry, dry_run: bool, report: &mut EvictionReport) -> Result<(), StoreError> {
  if !dry_run {
    remove_entry(&entry.path)?;
  }
  report.bytes_freed += entry.size;
  report.evicted.push(EvictedEntry {
    category: entry.category,
    hash: entry.hash,
    size: entry.size,
    path: entry.path,
  });
  Ok(())
}
