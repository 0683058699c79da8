//! Graph-wide hashing.
//!
//! Targets are hashed wave by wave: every target in a wave has all of its
//! dependencies hashed in earlier waves, so a wave can be hashed fully in
//! parallel. Fingerprinting reads files, so each target is hashed on the
//! blocking pool; a semaphore bounds how many run at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::HashError;
use super::fingerprint::Fingerprinter;
use super::target::{TargetContentHash, TargetHasher};
use crate::graph::{Graph, HashDag, TargetId};
use crate::util::cancel::CancelToken;

/// Content hashes of every non-excluded target.
pub type GraphHashes = BTreeMap<TargetId, TargetContentHash>;

#[derive(Debug, Clone, Default)]
pub struct HashOptions {
  /// Names of targets to leave out of the hashing pass.
  pub excluded: Vec<String>,
  /// Strings folded into every target's hash (tool version, configuration, ...).
  pub additional_strings: Vec<String>,
}

/// Resolve excluded names to target ids.
///
/// Besides the named targets this also excludes resource bundles generated
/// for them, which follow the `<project name>_<target name>` convention.
pub fn excluded_targets(graph: &Graph, names: &[String]) -> HashSet<TargetId> {
  if names.is_empty() {
    return HashSet::new();
  }

  let names: HashSet<&str> = names.iter().map(String::as_str).collect();
  graph
    .targets()
    .filter(|(_, target)| {
      if names.contains(target.name.as_str()) {
        return true;
      }
      let project = &graph.project(target.project).name;
      target
        .name
        .strip_prefix(project.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| names.contains(rest))
    })
    .map(|(id, _)| id)
    .collect()
}

pub struct GraphHasher<F> {
  target_hasher: Arc<TargetHasher<F>>,
  parallelism: usize,
}

impl<F: Fingerprinter + 'static> GraphHasher<F> {
  pub fn new(fingerprinter: F, parallelism: usize) -> Self {
    Self {
      target_hasher: Arc::new(TargetHasher::new(fingerprinter)),
      parallelism: parallelism.max(1),
    }
  }

  /// Hash every non-excluded target of `graph`.
  pub async fn hash(
    &self,
    graph: Arc<Graph>,
    options: &HashOptions,
    cancel: &CancelToken,
  ) -> Result<GraphHashes, HashError> {
    let excluded = excluded_targets(&graph, &options.excluded);
    let dag = HashDag::from_graph(&graph, &excluded)?;
    let waves = dag.waves();

    info!(
      target_count = dag.len(),
      excluded = excluded.len(),
      wave_count = waves.len(),
      "hashing target graph"
    );

    let excluded = Arc::new(excluded);
    let additional = Arc::new(options.additional_strings.clone());
    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let mut hashes = GraphHashes::new();

    for (wave_idx, wave) in waves.iter().enumerate() {
      if cancel.is_cancelled() {
        return Err(HashError::Cancelled);
      }
      debug!(wave = wave_idx, targets = wave.len(), "hashing wave");

      let mut join_set = JoinSet::new();
      for &id in wave {
        let dependency_hashes: HashMap<TargetId, String> = dag
          .dependencies(id)
          .into_iter()
          .filter_map(|dep| hashes.get(&dep).map(|h| (dep, h.hash.clone())))
          .collect();

        let graph = graph.clone();
        let excluded = excluded.clone();
        let additional = additional.clone();
        let hasher = self.target_hasher.clone();
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
          let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| HashError::Task(e.to_string()))?;
          let result = tokio::task::spawn_blocking(move || {
            hasher.hash(&graph, id, &dependency_hashes, &excluded, &additional)
          })
          .await
          .map_err(|e| HashError::Task(e.to_string()))?;
          Ok::<_, HashError>((id, result?))
        });
      }

      loop {
        let next = tokio::select! {
          _ = cancel.cancelled() => {
            join_set.abort_all();
            return Err(HashError::Cancelled);
          }
          next = join_set.join_next() => next,
        };
        let Some(joined) = next else {
          break;
        };

        let (id, content) = joined.map_err(|e| HashError::Task(e.to_string()))??;
        debug!(target_name = %graph.target(id).name, hash = %content.hash, "hashed target");
        hashes.insert(id, content);
      }
    }

    info!(hashed = hashes.len(), "target graph hashed");
    Ok(hashes)
  }
}
