use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::graph::TargetId;
use crate::hash::GraphHashes;

/// Kind of artifact stored for a target. Each category is its own
/// namespace, locally and remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
  /// Compiled frameworks and libraries.
  #[default]
  Binaries,
  /// Test bundles used for selective testing.
  SelectiveTests,
}

impl CacheCategory {
  pub const ALL: [CacheCategory; 2] = [CacheCategory::Binaries, CacheCategory::SelectiveTests];

  pub fn as_str(&self) -> &'static str {
    match self {
      CacheCategory::Binaries => "binaries",
      CacheCategory::SelectiveTests => "selective-tests",
    }
  }
}

impl fmt::Display for CacheCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CacheCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    CacheCategory::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| format!("unknown cache category '{}' (expected binaries or selective-tests)", s))
  }
}

/// Where a target's artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
  Local,
  Remote,
  Miss,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      CacheSource::Local => "local",
      CacheSource::Remote => "remote",
      CacheSource::Miss => "miss",
    };
    f.write_str(s)
  }
}

/// Outcome of resolving one target's hash against the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheItem {
  pub target: TargetId,
  pub name: String,
  pub hash: String,
  pub source: CacheSource,
  pub category: CacheCategory,
  #[serde(skip_serializing_if = "Option::is_none", with = "duration_ms")]
  pub build_duration: Option<Duration>,
  /// Artifact inside the local store. Set for `local` and `remote`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub artifact: Option<PathBuf>,
}

impl CacheItem {
  pub fn is_hit(&self) -> bool {
    self.source != CacheSource::Miss
  }
}

/// Step of resolution or storage that produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStage {
  Local,
  Remote,
  Download,
  Commit,
  Upload,
}

impl fmt::Display for CacheStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      CacheStage::Local => "local lookup",
      CacheStage::Remote => "remote lookup",
      CacheStage::Download => "download",
      CacheStage::Commit => "local commit",
      CacheStage::Upload => "upload",
    };
    f.write_str(s)
  }
}

/// A failure that downgraded one target instead of failing the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheWarning {
  pub target: TargetId,
  pub name: String,
  pub stage: CacheStage,
  pub message: String,
}

impl fmt::Display for CacheWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {} failed: {}", self.name, self.stage, self.message)
  }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
  pub category: CacheCategory,
  /// Only consult the local store.
  pub offline: bool,
}

/// Result of a resolution run: one item per hashed target.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
  pub items: BTreeMap<TargetId, CacheItem>,
  pub warnings: Vec<CacheWarning>,
  pub hashes: GraphHashes,
}

impl ResolveReport {
  pub fn count(&self, source: CacheSource) -> usize {
    self.items.values().filter(|item| item.source == source).count()
  }

  pub fn misses(&self) -> impl Iterator<Item = &CacheItem> {
    self.items.values().filter(|item| !item.is_hit())
  }
}

/// A freshly built artifact to put into the cache.
#[derive(Debug, Clone)]
pub struct StoreRequest {
  pub target: TargetId,
  pub name: String,
  pub hash: String,
  pub category: CacheCategory,
  pub source: PathBuf,
  pub build_duration: Option<Duration>,
}

/// Outcome of storing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
  pub target: TargetId,
  pub name: String,
  pub hash: String,
  /// Artifact inside the local store.
  pub artifact: PathBuf,
  pub uploaded: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<CacheWarning>,
}

mod duration_ms {
  use std::time::Duration;

  use serde::Serializer;

  pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(d) => serializer.serialize_u64(d.as_millis() as u64),
      None => serializer.serialize_none(),
    }
  }
}
