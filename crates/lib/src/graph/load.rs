//! JSON interchange format for target graphs.
//!
//! The manifest DSL is evaluated elsewhere; this loader accepts its resolved
//! output:
//!
//! ```json
//! {
//!   "projects": [
//!     {
//!       "path": "Modules/Kit",
//!       "name": "Kit",
//!       "targets": [
//!         {
//!           "name": "Kit",
//!           "product": "framework",
//!           "sources": [{ "path": "Sources/Kit.swift" }],
//!           "dependencies": [{ "kind": "target", "name": "Support", "project": "Modules/Support" }]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative project paths are resolved against the directory holding the
//! graph file. Target references without a `project` resolve within the
//! declaring project.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::GraphError;
use super::types::{
  Dependency, Graph, GraphBuilder, LinkStatus, Linking, Project, ProjectKind, Settings, TargetId, TargetInputs,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphManifest {
  #[serde(default)]
  pub projects: Vec<ProjectManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
  pub path: PathBuf,
  pub name: String,
  #[serde(default)]
  pub kind: ProjectKind,
  #[serde(default)]
  pub settings: Settings,
  #[serde(default)]
  pub targets: Vec<TargetManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetManifest {
  pub name: String,
  #[serde(flatten)]
  pub inputs: TargetInputs,
  #[serde(default)]
  pub dependencies: Vec<DependencyManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DependencyManifest {
  Target {
    name: String,
    #[serde(default)]
    project: Option<PathBuf>,
  },
  Framework {
    path: PathBuf,
    #[serde(default)]
    status: LinkStatus,
  },
  Xcframework {
    path: PathBuf,
    #[serde(default)]
    status: LinkStatus,
  },
  Library {
    path: PathBuf,
    linking: Linking,
  },
  Package {
    product: String,
  },
  Sdk {
    name: String,
    #[serde(default)]
    status: LinkStatus,
  },
}

impl GraphManifest {
  pub fn from_json(json: &str) -> Result<Self, GraphError> {
    Ok(serde_json::from_str(json)?)
  }

  /// Resolve the manifest into an arena graph.
  ///
  /// Targets are registered in a first pass so dependencies may point forward
  /// to projects declared later in the document.
  pub fn into_graph(self, base_dir: &Path) -> Result<Graph, GraphError> {
    let mut builder = GraphBuilder::new();
    // (id, declaring project path, identity for errors, dependencies)
    let mut pending: Vec<(TargetId, PathBuf, String, Vec<DependencyManifest>)> = Vec::new();

    for project in self.projects {
      let project_path = base_dir.join(&project.path);
      let project_id = builder.add_project(Project {
        path: project_path.clone(),
        name: project.name,
        kind: project.kind,
        settings: project.settings,
      });

      for target in project.targets {
        let identity = format!("{}:{}", project_path.display(), target.name);
        let id = builder.add_target(project_id, target.name, target.inputs)?;
        pending.push((id, project_path.clone(), identity, target.dependencies));
      }
    }

    for (id, project_path, identity, dependencies) in pending {
      for dependency in dependencies {
        let resolved = match dependency {
          DependencyManifest::Target { name, project } => {
            let dep_project = project.map(|p| base_dir.join(p)).unwrap_or_else(|| project_path.clone());
            let dep_id = builder
              .lookup(&dep_project, &name)
              .ok_or_else(|| GraphError::UnknownTarget {
                from: identity.clone(),
                name: format!("{}:{}", dep_project.display(), name),
              })?;
            Dependency::Target(dep_id)
          }
          DependencyManifest::Framework { path, status } => Dependency::Framework {
            path: project_path.join(path),
            status,
          },
          DependencyManifest::Xcframework { path, status } => Dependency::XcFramework {
            path: project_path.join(path),
            status,
          },
          DependencyManifest::Library { path, linking } => Dependency::Library {
            path: project_path.join(path),
            linking,
          },
          DependencyManifest::Package { product } => Dependency::Package { product },
          DependencyManifest::Sdk { name, status } => Dependency::Sdk { name, status },
        };
        builder.add_dependency(id, resolved)?;
      }
    }

    let graph = builder.build();
    debug!(
      projects = graph.project_count(),
      targets = graph.target_count(),
      "loaded target graph"
    );
    Ok(graph)
  }
}

/// Load a graph from a JSON file.
pub fn load_graph(path: &Path) -> Result<Graph, GraphError> {
  let content = fs::read_to_string(path).map_err(|source| GraphError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
  GraphManifest::from_json(&content)?.into_graph(base_dir)
}
