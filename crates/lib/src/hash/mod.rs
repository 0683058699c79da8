//! Content hashing for targets.
//!
//! Each target gets a [`Subhashes`] set (one fingerprint per input category)
//! and a content hash folded from its identity attributes, its subhashes and
//! the content hashes of its direct dependencies. Because dependency hashes
//! feed the fold, a change anywhere below a target changes the target's hash.

pub mod fingerprint;
pub mod graph;
pub mod subhash;
pub mod target;

use thiserror::Error;

use crate::graph::GraphError;

pub use fingerprint::{ContentFingerprinter, FileContent, FileInput, FingerprintError, Fingerprinter};
pub use graph::{GraphHasher, GraphHashes, HashOptions, excluded_targets};
pub use subhash::Subhashes;
pub use target::{TargetContentHash, TargetHasher};

#[derive(Debug, Error)]
pub enum HashError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("failed to hash target {target}: {source}")]
  Fingerprint {
    target: String,
    #[source]
    source: FingerprintError,
  },

  #[error("dependency {dependency} of target {target} has not been hashed")]
  MissingDependencyHash { target: String, dependency: String },

  #[error("hashing task failed: {0}")]
  Task(String),

  #[error("hashing was cancelled")]
  Cancelled,
}
