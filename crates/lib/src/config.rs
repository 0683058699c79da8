//! Configuration loaded from `stowage.toml` and the environment.
//!
//! Every field has a default, so an empty (or missing) file is valid.
//! Environment variables win over file values:
//!
//! | Variable                 | Field                   |
//! |--------------------------|-------------------------|
//! | `STOWAGE_CACHE_DIR`      | `cache_dir`             |
//! | `STOWAGE_URL`            | `remote.url`            |
//! | `STOWAGE_PROJECT`        | `remote.project_id`     |
//! | `STOWAGE_TOKEN`          | `remote.token`          |
//! | `STOWAGE_VERIFYING_KEY`  | `remote.verifying_key`  |

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  CONFIG_FILENAME, DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_ATTEMPTS, DEFAULT_PART_CONCURRENCY, DEFAULT_PART_SIZE,
  DEFAULT_REQUEST_TIMEOUT_SECS, ENV_PREFIX,
};
use crate::platform::paths::{cache_dir, config_dir};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Root of the local artifact store.
  pub cache_dir: PathBuf,
  /// Maximum number of targets hashed or resolved at once.
  pub parallelism: usize,
  /// Whether `store` also uploads to the remote cache.
  pub upload: bool,
  pub remote: Option<RemoteConfig>,
  pub gc: GcConfig,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      cache_dir: cache_dir(),
      parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
      upload: true,
      remote: None,
      gc: GcConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the cache service, e.g. `https://cache.example.com`.
  pub url: String,
  pub project_id: String,
  #[serde(default)]
  pub token: Option<String>,
  /// Base64 Ed25519 public key used to authenticate artifact responses.
  #[serde(default)]
  pub verifying_key: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default)]
  pub multipart: MultipartConfig,
}

impl RemoteConfig {
  pub fn new(url: impl Into<String>, project_id: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      project_id: project_id.into(),
      token: None,
      verifying_key: None,
      timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
      multipart: MultipartConfig::default(),
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_timeout_secs() -> u64 {
  DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
  /// Artifacts at or above this many bytes use the multipart protocol.
  pub threshold: u64,
  pub part_size: u64,
  pub concurrency: usize,
  /// Upload rounds. A part that fails transiently is resent in the next round.
  pub part_attempts: u32,
}

impl Default for MultipartConfig {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_MULTIPART_THRESHOLD,
      part_size: DEFAULT_PART_SIZE,
      concurrency: DEFAULT_PART_CONCURRENCY,
      part_attempts: DEFAULT_PART_ATTEMPTS,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
  pub max_age_secs: Option<u64>,
  pub max_size_bytes: Option<u64>,
}

impl CacheConfig {
  /// Load configuration.
  ///
  /// With an explicit `path` the file must exist. Otherwise `./stowage.toml`
  /// and then `<config dir>/stowage.toml` are tried, falling back to defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None => {
        let candidates = [PathBuf::from(CONFIG_FILENAME), config_dir().join(CONFIG_FILENAME)];
        match candidates.iter().find(|p| p.is_file()) {
          Some(found) => Self::from_file(found)?,
          None => {
            debug!("no config file found, using defaults");
            Self::default()
          }
        }
      }
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
  }

  /// Apply `STOWAGE_*` overrides.
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Some(dir) = env_var("CACHE_DIR") {
      self.cache_dir = PathBuf::from(dir);
    }

    let url = env_var("URL");
    let project = env_var("PROJECT");
    if self.remote.is_none() && url.is_some() {
      let project = project.clone().ok_or_else(|| {
        ConfigError::Invalid(format!("{ENV_PREFIX}URL is set but {ENV_PREFIX}PROJECT is not"))
      })?;
      self.remote = Some(RemoteConfig::new(url.clone().unwrap_or_default(), project));
    }

    if let Some(remote) = self.remote.as_mut() {
      if let Some(url) = url {
        remote.url = url;
      }
      if let Some(project) = project {
        remote.project_id = project;
      }
      if let Some(token) = env_var("TOKEN") {
        remote.token = Some(token);
      }
      if let Some(key) = env_var("VERIFYING_KEY") {
        remote.verifying_key = Some(key);
      }
    }

    Ok(())
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.parallelism == 0 {
      return Err(ConfigError::Invalid("parallelism must be at least 1".to_string()));
    }
    if let Some(remote) = &self.remote {
      if remote.url.trim().is_empty() {
        return Err(ConfigError::Invalid("remote.url is empty".to_string()));
      }
      if remote.project_id.trim().is_empty() {
        return Err(ConfigError::Invalid("remote.project_id is empty".to_string()));
      }
      if remote.multipart.part_size == 0 || remote.multipart.concurrency == 0 {
        return Err(ConfigError::Invalid(
          "multipart part_size and concurrency must be positive".to_string(),
        ));
      }
    }
    Ok(())
  }
}

fn env_var(suffix: &str) -> Option<String> {
  std::env::var(format!("{ENV_PREFIX}{suffix}"))
    .ok()
    .filter(|v| !v.is_empty())
}
