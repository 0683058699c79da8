use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use stowage_lib::cache::{CacheCategory, StoreRequest};

use super::{coordinator, hash_options, hasher, load, load_config, runtime};
use crate::GraphArgs;
use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success, print_warning, short_hash};

#[derive(Debug, Clone)]
pub struct StoreArgs {
  pub target: String,
  pub artifact: PathBuf,
  pub category: CacheCategory,
  pub build_duration: Option<Duration>,
  pub upload: bool,
}

/// Hash the graph, then store `artifact` under the named target's hash.
pub fn cmd_store(config: Option<&Path>, args: &GraphArgs, store: StoreArgs, output: OutputFormat) -> Result<()> {
  let mut config = load_config(config)?;
  config.upload &= store.upload;

  if !store.artifact.exists() {
    bail!("Artifact not found: {}", store.artifact.display());
  }

  let graph = load(args)?;
  let target = match graph.find_by_name(&store.target).as_slice() {
    [id] => *id,
    [] => bail!("Unknown target '{}'", store.target),
    _ => bail!("Target name '{}' is ambiguous", store.target),
  };

  let coordinator = coordinator(&config)?;
  let (rt, cancel) = runtime()?;
  let outcome = rt.block_on(async {
    let hashes = hasher(&config)
      .hash(graph.clone(), &hash_options(args), &cancel)
      .await
      .context("Hashing failed")?;
    let Some(content) = hashes.get(&target) else {
      bail!("Target '{}' is excluded", store.target);
    };

    info!(target_name = %store.target, hash = %content.hash, "storing artifact");
    coordinator
      .store(StoreRequest {
        target,
        name: store.target.clone(),
        hash: content.hash.clone(),
        category: store.category,
        source: store.artifact.clone(),
        build_duration: store.build_duration,
      })
      .await
      .context("Failed to store artifact")
  })?;

  if output.is_json() {
    return print_json(&outcome);
  }

  if let Some(warning) = &outcome.warning {
    print_warning(&warning.to_string());
  }
  print_success(&format!("Stored {} ({})", outcome.name, short_hash(&outcome.hash)));
  print_stat("Artifact", &outcome.artifact.display().to_string());
  print_stat("Uploaded", if outcome.uploaded { "yes" } else { "no" });
  if let Some(duration) = store.build_duration {
    print_stat("Build duration", &format_duration(duration));
  }

  Ok(())
}
