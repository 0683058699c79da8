//! Cache coordination.
//!
//! Each target moves through
//! `Hashed -> CheckingLocal -> (local | CheckingRemote -> (Downloading -> remote | miss))`
//! and ends as exactly one [`CacheItem`]. Only structural problems (graph,
//! fingerprinting) fail a run; everything past hashing downgrades the one
//! target to a miss and records a [`CacheWarning`].

pub mod types;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::graph::{Graph, TargetId};
use crate::hash::{Fingerprinter, GraphHasher, GraphHashes, HashError, HashOptions};
use crate::remote::{CacheKey, RemoteCache, RemoteError};
use crate::store::{LocalStore, StoreError, StoredArtifact};
use crate::util::cancel::CancelToken;

pub use types::{
  CacheCategory, CacheItem, CacheSource, CacheStage, CacheWarning, ResolveOptions, ResolveReport, StoreOutcome,
  StoreRequest,
};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to store {name} locally: {source}")]
  Store {
    name: String,
    #[source]
    source: StoreError,
  },

  #[error("cache task failed: {0}")]
  Task(String),

  #[error("cache run was cancelled")]
  Cancelled,
}

/// Resolves targets against the local store and, when configured, the
/// remote cache.
pub struct CacheCoordinator<L, R> {
  local: Arc<L>,
  remote: Option<Arc<R>>,
  parallelism: usize,
  upload: bool,
}

impl<L, R> CacheCoordinator<L, R>
where
  L: LocalStore + 'static,
  R: RemoteCache + 'static,
{
  pub fn new(local: L, remote: Option<R>) -> Self {
    Self {
      local: Arc::new(local),
      remote: remote.map(Arc::new),
      parallelism: 4,
      upload: true,
    }
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  /// Whether `store` also uploads to the remote cache.
  pub fn with_upload(mut self, upload: bool) -> Self {
    self.upload = upload;
    self
  }

  pub fn local(&self) -> &L {
    &self.local
  }

  /// Hash `graph` and resolve every hashed target.
  pub async fn run<F: Fingerprinter + 'static>(
    &self,
    graph: Arc<Graph>,
    hasher: &GraphHasher<F>,
    hash_options: &HashOptions,
    options: &ResolveOptions,
    cancel: &CancelToken,
  ) -> Result<ResolveReport, CacheError> {
    let hashes = hasher.hash(graph.clone(), hash_options, cancel).await.map_err(|e| match e {
      HashError::Cancelled => CacheError::Cancelled,
      e => CacheError::Hash(e),
    })?;
    self.resolve(&graph, hashes, options, cancel).await
  }

  /// Resolve already computed hashes. Targets resolve independently and
  /// concurrently; results complete in any order.
  pub async fn resolve(
    &self,
    graph: &Graph,
    hashes: GraphHashes,
    options: &ResolveOptions,
    cancel: &CancelToken,
  ) -> Result<ResolveReport, CacheError> {
    if cancel.is_cancelled() {
      return Err(CacheError::Cancelled);
    }
    let remote = if options.offline { None } else { self.remote.clone() };
    info!(
      targets = hashes.len(),
      category = %options.category,
      remote = remote.is_some(),
      "resolving targets"
    );

    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let mut join_set = JoinSet::new();

    for (&id, content) in &hashes {
      let job = Resolution {
        target: id,
        name: graph.target(id).name.clone(),
        hash: content.hash.clone(),
        category: options.category,
      };
      let local = self.local.clone();
      let remote = remote.clone();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| CacheError::Task(e.to_string()))?;
        Ok::<_, CacheError>(job.run(local, remote).await)
      });
    }

    let mut report = ResolveReport::default();
    loop {
      let next = tokio::select! {
        _ = cancel.cancelled() => {
          join_set.abort_all();
          return Err(CacheError::Cancelled);
        }
        next = join_set.join_next() => next,
      };
      let Some(joined) = next else {
        break;
      };

      let (item, warnings) = joined.map_err(|e| CacheError::Task(e.to_string()))??;
      debug!(target_name = %item.name, source = %item.source, "resolved target");
      report.warnings.extend(warnings);
      report.items.insert(item.target, item);
    }

    report.warnings.sort_by_key(|w| w.target);
    report.hashes = hashes;
    info!(
      local = report.count(CacheSource::Local),
      remote = report.count(CacheSource::Remote),
      miss = report.count(CacheSource::Miss),
      warnings = report.warnings.len(),
      "resolution finished"
    );
    Ok(report)
  }

  /// Store a freshly built artifact locally, then upload it. A failed local
  /// commit is an error; a failed upload is only a warning.
  pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome, CacheError> {
    let remote = if self.upload { self.remote.clone() } else { None };
    store_one(self.local.clone(), remote, request).await
  }

  /// Store a batch of artifacts concurrently. Outcomes are ordered by target.
  pub async fn store_many(
    &self,
    requests: Vec<StoreRequest>,
    cancel: &CancelToken,
  ) -> Result<Vec<StoreOutcome>, CacheError> {
    if cancel.is_cancelled() {
      return Err(CacheError::Cancelled);
    }
    let remote = if self.upload { self.remote.clone() } else { None };
    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let mut join_set = JoinSet::new();

    for request in requests {
      let local = self.local.clone();
      let remote = remote.clone();
      let semaphore = semaphore.clone();
      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| CacheError::Task(e.to_string()))?;
        store_one(local, remote, request).await
      });
    }

    let mut outcomes = Vec::new();
    loop {
      let next = tokio::select! {
        _ = cancel.cancelled() => {
          join_set.abort_all();
          return Err(CacheError::Cancelled);
        }
        next = join_set.join_next() => next,
      };
      let Some(joined) = next else {
        break;
      };
      outcomes.push(joined.map_err(|e| CacheError::Task(e.to_string()))??);
    }

    outcomes.sort_by_key(|o| o.target);
    Ok(outcomes)
  }
}

/// One target's walk through the resolution states.
struct Resolution {
  target: TargetId,
  name: String,
  hash: String,
  category: CacheCategory,
}

impl Resolution {
  async fn run<L, R>(self, local: Arc<L>, remote: Option<Arc<R>>) -> (CacheItem, Vec<CacheWarning>)
  where
    L: LocalStore + 'static,
    R: RemoteCache,
  {
    let mut warnings = Vec::new();

    match self.check_local(&local).await {
      Ok(Some(artifact)) => return (self.item(CacheSource::Local, Some(&artifact)), warnings),
      Ok(None) => {}
      Err(message) => {
        warnings.push(self.warning(CacheStage::Local, message));
        return (self.item(CacheSource::Miss, None), warnings);
      }
    }

    let Some(remote) = remote else {
      return (self.item(CacheSource::Miss, None), warnings);
    };

    let key = CacheKey::new(&self.name, &self.hash, self.category);
    match retry_transient(|| remote.exists(&key)).await {
      Ok(true) => {}
      Ok(false) => {
        debug!(target_name = %self.name, hash = %self.hash, "remote cache miss");
        return (self.item(CacheSource::Miss, None), warnings);
      }
      Err(e) => {
        warnings.push(self.warning(CacheStage::Remote, e.to_string()));
        return (self.item(CacheSource::Miss, None), warnings);
      }
    }

    match self.download(&local, remote.as_ref(), &key).await {
      Ok(artifact) => (self.item(CacheSource::Remote, Some(&artifact)), warnings),
      Err((stage, message)) => {
        warnings.push(self.warning(stage, message));
        (self.item(CacheSource::Miss, None), warnings)
      }
    }
  }

  async fn check_local<L: LocalStore + 'static>(&self, local: &Arc<L>) -> Result<Option<StoredArtifact>, String> {
    let local = local.clone();
    let category = self.category;
    let hash = self.hash.clone();
    tokio::task::spawn_blocking(move || local.fetch(category, &hash))
      .await
      .map_err(|e| e.to_string())?
      .map_err(|e| e.to_string())
  }

  /// Download into a staging file next to the store, then commit. The staging
  /// file is removed on drop, so nothing partial is ever visible.
  async fn download<L, R>(
    &self,
    local: &Arc<L>,
    remote: &R,
    key: &CacheKey,
  ) -> Result<StoredArtifact, (CacheStage, String)>
  where
    L: LocalStore + 'static,
    R: RemoteCache,
  {
    let staging = {
      let local = local.clone();
      let category = self.category;
      tokio::task::spawn_blocking(move || local.staging_file(category))
        .await
        .map_err(|e| (CacheStage::Commit, e.to_string()))?
        .map_err(|e| (CacheStage::Commit, e.to_string()))?
    };

    let destination = staging.path().to_path_buf();
    let bytes = retry_transient(|| remote.fetch(key, &destination))
      .await
      .map_err(|e| (CacheStage::Download, e.to_string()))?;
    debug!(target_name = %self.name, hash = %self.hash, bytes, "downloaded artifact");

    let local = local.clone();
    let category = self.category;
    let name = self.name.clone();
    let hash = self.hash.clone();
    tokio::task::spawn_blocking(move || local.store(category, &name, &hash, staging.path(), None))
      .await
      .map_err(|e| (CacheStage::Commit, e.to_string()))?
      .map_err(|e| (CacheStage::Commit, e.to_string()))
  }

  fn item(&self, source: CacheSource, artifact: Option<&StoredArtifact>) -> CacheItem {
    CacheItem {
      target: self.target,
      name: self.name.clone(),
      hash: self.hash.clone(),
      source,
      category: self.category,
      build_duration: artifact.and_then(|a| a.metadata.build_duration()),
      artifact: artifact.map(|a| a.path.clone()),
    }
  }

  fn warning(&self, stage: CacheStage, message: String) -> CacheWarning {
    warn!(target_name = %self.name, hash = %self.hash, %stage, error = %message, "treating target as a cache miss");
    CacheWarning {
      target: self.target,
      name: self.name.clone(),
      stage,
      message,
    }
  }
}

async fn store_one<L, R>(local: Arc<L>, remote: Option<Arc<R>>, request: StoreRequest) -> Result<StoreOutcome, CacheError>
where
  L: LocalStore + 'static,
  R: RemoteCache,
{
  let stored = {
    let local = local.clone();
    let job = request.clone();
    tokio::task::spawn_blocking(move || local.store(job.category, &job.name, &job.hash, &job.source, job.build_duration))
      .await
      .map_err(|e| CacheError::Task(e.to_string()))?
      .map_err(|source| CacheError::Store {
        name: request.name.clone(),
        source,
      })?
  };

  let mut outcome = StoreOutcome {
    target: request.target,
    name: request.name.clone(),
    hash: request.hash.clone(),
    artifact: stored.path.clone(),
    uploaded: false,
    warning: None,
  };

  let Some(remote) = remote else {
    return Ok(outcome);
  };

  let key = CacheKey::new(&request.name, &request.hash, request.category);
  match upload(remote.as_ref(), &key, &stored.path).await {
    Ok(()) => outcome.uploaded = true,
    Err(e) => {
      warn!(target_name = %request.name, hash = %request.hash, error = %e, "upload failed");
      outcome.warning = Some(CacheWarning {
        target: request.target,
        name: request.name,
        stage: CacheStage::Upload,
        message: e.to_string(),
      });
    }
  }
  Ok(outcome)
}

/// Upload unless the remote already has the artifact.
async fn upload<R: RemoteCache>(remote: &R, key: &CacheKey, source: &Path) -> Result<(), RemoteError> {
  if retry_transient(|| remote.exists(key)).await? {
    debug!(name = %key.name, hash = %key.hash, "artifact already on remote");
    return Ok(());
  }
  retry_transient(|| remote.store(key, source)).await
}

/// Run `op`, repeating it once if the first attempt failed transiently.
async fn retry_transient<T, Fut>(op: impl Fn() -> Fut) -> Result<T, RemoteError>
where
  Fut: Future<Output = Result<T, RemoteError>>,
{
  match op().await {
    Err(e) if e.is_transient() => {
      debug!(error = %e, "retrying after transient error");
      op().await
    }
    result => result,
  }
}
