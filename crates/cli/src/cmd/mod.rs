mod gc;
mod hash;
mod resolve;
mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use stowage_lib::cache::CacheCoordinator;
use stowage_lib::config::CacheConfig;
use stowage_lib::graph::{Graph, load_graph};
use stowage_lib::hash::{ContentFingerprinter, GraphHasher, HashOptions};
use stowage_lib::remote::HttpCacheClient;
use stowage_lib::store::DiskStore;
use stowage_lib::util::cancel::CancelToken;

use crate::GraphArgs;

pub use gc::cmd_gc;
pub use hash::cmd_hash;
pub use resolve::cmd_resolve;
pub use store::{StoreArgs, cmd_store};

type Coordinator = CacheCoordinator<DiskStore, HttpCacheClient>;

fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
  let config = CacheConfig::load(path).context("Failed to load configuration")?;
  debug!(cache_dir = %config.cache_dir.display(), remote = config.remote.is_some(), "configuration loaded");
  Ok(config)
}

fn load(args: &GraphArgs) -> Result<Arc<Graph>> {
  let graph = load_graph(&args.graph).with_context(|| format!("Failed to load graph {}", args.graph.display()))?;
  Ok(Arc::new(graph))
}

fn hash_options(args: &GraphArgs) -> HashOptions {
  HashOptions {
    excluded: args.exclude.clone(),
    additional_strings: args.additional.clone(),
  }
}

fn hasher(config: &CacheConfig) -> GraphHasher<ContentFingerprinter> {
  GraphHasher::new(ContentFingerprinter::new(), config.parallelism)
}

fn coordinator(config: &CacheConfig) -> Result<Coordinator> {
  let remote = match &config.remote {
    Some(remote) => {
      let http = HttpCacheClient::http_client(remote).context("Failed to create HTTP client")?;
      Some(HttpCacheClient::new(http, remote).context("Invalid remote cache configuration")?)
    }
    None => None,
  };

  Ok(
    CacheCoordinator::new(DiskStore::new(&config.cache_dir), remote)
      .with_parallelism(config.parallelism)
      .with_upload(config.upload),
  )
}

/// A multi-threaded runtime plus a token that is cancelled on Ctrl-C.
fn runtime() -> Result<(tokio::runtime::Runtime, CancelToken)> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cancel = CancelToken::new();

  let token = cancel.clone();
  rt.spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });

  Ok((rt, cancel))
}
