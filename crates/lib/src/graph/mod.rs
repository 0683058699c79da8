//! Target graph model.
//!
//! The graph is produced by an external loader (or the JSON interchange in
//! [`load`]) and consumed read-only by the hasher and the cache coordinator.

pub mod dag;
pub mod load;
pub mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use dag::HashDag;
pub use load::{GraphManifest, load_graph};
pub use types::{
  Configuration, CopyFilesAction, CoreDataModel, Dependency, Graph, GraphBuilder, Headers, InfoPlist, LinkStatus,
  Linking, Product, Project, ProjectId, ProjectKind, ResourceFile, ScriptOrder, SettingValue, Settings, SourceFile,
  Target, TargetId, TargetInputs, TargetScript,
};

/// Structural problems with a graph. These abort a cache run.
#[derive(Debug, Error)]
pub enum GraphError {
  /// The target graph contains a dependency cycle.
  #[error("dependency cycle detected between targets: {}", targets.join(", "))]
  Cycle { targets: Vec<String> },

  #[error("duplicate target: {identity}")]
  DuplicateTarget { identity: String },

  #[error("target {from} depends on unknown target '{name}'")]
  UnknownTarget { from: String, name: String },

  #[error("unknown target id {0}")]
  UnknownTargetId(TargetId),

  #[error("unknown project id {0}")]
  UnknownProject(ProjectId),

  #[error("failed to read graph file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse graph: {0}")]
  Parse(#[from] serde_json::Error),
}
