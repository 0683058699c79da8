//! Arena types for the target graph.
//!
//! Projects and targets live in flat tables and reference each other through
//! integer ids. The graph is built once (by the loader or a [`GraphBuilder`])
//! and is read-only afterwards, so it can be shared freely across hashing and
//! resolution workers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::GraphError;

/// Index of a target in [`Graph::targets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub usize);

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Index of a project in [`Graph::projects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub usize);

impl fmt::Display for ProjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// The kind of product a target builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
  #[default]
  App,
  Framework,
  StaticFramework,
  StaticLibrary,
  DynamicLibrary,
  Bundle,
  UnitTests,
  UiTests,
  AppExtension,
  Macro,
  CommandLineTool,
}

impl Product {
  pub fn as_str(&self) -> &'static str {
    match self {
      Product::App => "app",
      Product::Framework => "framework",
      Product::StaticFramework => "static_framework",
      Product::StaticLibrary => "static_library",
      Product::DynamicLibrary => "dynamic_library",
      Product::Bundle => "bundle",
      Product::UnitTests => "unit_tests",
      Product::UiTests => "ui_tests",
      Product::AppExtension => "app_extension",
      Product::Macro => "macro",
      Product::CommandLineTool => "command_line_tool",
    }
  }
}

impl fmt::Display for Product {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Whether a project is authored locally or resolved from an external package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProjectKind {
  #[default]
  Local,
  /// A project produced by a package resolver. When `hash` is set it stands
  /// in for the content of every target in the project.
  External {
    #[serde(default)]
    hash: Option<String>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
  pub path: PathBuf,
  pub name: String,
  pub kind: ProjectKind,
  pub settings: Settings,
}

impl Project {
  /// Resolve a target input path against the project directory.
  pub fn resolve(&self, path: &Path) -> PathBuf {
    self.path.join(path)
  }

  pub fn external_hash(&self) -> Option<&str> {
    match &self.kind {
      ProjectKind::External { hash } => hash.as_deref(),
      ProjectKind::Local => None,
    }
  }
}

/// A build setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
  String(String),
  Array(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
  #[serde(default)]
  pub settings: BTreeMap<String, SettingValue>,
  #[serde(default)]
  pub xcconfig: Option<PathBuf>,
}

/// Build settings: a base dictionary plus per-configuration overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default)]
  pub base: BTreeMap<String, SettingValue>,
  #[serde(default)]
  pub configurations: BTreeMap<String, Configuration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
  pub path: PathBuf,
  #[serde(default)]
  pub compiler_flags: Option<String>,
  /// Inline content for generated sources that do not exist on disk yet.
  #[serde(default)]
  pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFile {
  pub path: PathBuf,
  #[serde(default)]
  pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFilesAction {
  pub name: String,
  pub destination: String,
  #[serde(default)]
  pub subpath: Option<String>,
  #[serde(default)]
  pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDataModel {
  pub path: PathBuf,
  pub current_version: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOrder {
  #[default]
  Pre,
  Post,
}

/// A build phase script. Exactly one of `inline` or `path` is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetScript {
  pub name: String,
  #[serde(default)]
  pub order: ScriptOrder,
  #[serde(default)]
  pub inline: Option<String>,
  #[serde(default)]
  pub path: Option<PathBuf>,
  #[serde(default)]
  pub input_paths: Vec<PathBuf>,
  #[serde(default)]
  pub output_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
  #[serde(default)]
  pub public: Vec<PathBuf>,
  #[serde(default)]
  pub private: Vec<PathBuf>,
  #[serde(default)]
  pub project: Vec<PathBuf>,
}

impl Headers {
  pub fn is_empty(&self) -> bool {
    self.public.is_empty() && self.private.is_empty() && self.project.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoPlist {
  File { path: PathBuf },
  Dictionary { dictionary: BTreeMap<String, serde_json::Value> },
}

/// Everything about a target that feeds its content hash, other than its
/// dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetInputs {
  pub product: Product,
  pub product_name: Option<String>,
  pub bundle_id: String,
  pub platforms: Vec<String>,
  pub sources: Vec<SourceFile>,
  pub resources: Vec<ResourceFile>,
  pub copy_files: Vec<CopyFilesAction>,
  pub core_data_models: Vec<CoreDataModel>,
  pub scripts: Vec<TargetScript>,
  pub headers: Option<Headers>,
  pub environment: BTreeMap<String, String>,
  pub deployment_targets: BTreeMap<String, String>,
  pub info_plist: Option<InfoPlist>,
  pub entitlements: Option<PathBuf>,
  pub settings: Option<Settings>,
  pub buildable_folders: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
  #[default]
  Required,
  Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linking {
  Static,
  Dynamic,
}

/// A dependency edge from a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
  Target(TargetId),
  Framework { path: PathBuf, status: LinkStatus },
  XcFramework { path: PathBuf, status: LinkStatus },
  Library { path: PathBuf, linking: Linking },
  Package { product: String },
  Sdk { name: String, status: LinkStatus },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
  pub name: String,
  pub project: ProjectId,
  pub inputs: TargetInputs,
  pub dependencies: Vec<Dependency>,
}

/// An immutable graph of projects and targets.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  projects: Vec<Project>,
  targets: Vec<Target>,
}

impl Graph {
  pub fn project(&self, id: ProjectId) -> &Project {
    &self.projects[id.0]
  }

  pub fn target(&self, id: TargetId) -> &Target {
    &self.targets[id.0]
  }

  pub fn get(&self, id: TargetId) -> Option<&Target> {
    self.targets.get(id.0)
  }

  /// The project owning a target.
  pub fn project_of(&self, id: TargetId) -> &Project {
    self.project(self.target(id).project)
  }

  pub fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
    (0..self.targets.len()).map(TargetId)
  }

  pub fn targets(&self) -> impl Iterator<Item = (TargetId, &Target)> {
    self.targets.iter().enumerate().map(|(idx, target)| (TargetId(idx), target))
  }

  pub fn target_count(&self) -> usize {
    self.targets.len()
  }

  pub fn project_count(&self) -> usize {
    self.projects.len()
  }

  /// Stable, human-readable identity of a target: `<project path>:<name>`.
  pub fn identity(&self, id: TargetId) -> String {
    let target = self.target(id);
    format!("{}:{}", self.project(target.project).path.display(), target.name)
  }

  /// Look up a target by its project path and name.
  pub fn find(&self, project_path: &Path, name: &str) -> Option<TargetId> {
    self
      .targets()
      .find(|(_, target)| target.name == name && self.project(target.project).path == project_path)
      .map(|(id, _)| id)
  }

  /// All targets with the given name, across projects.
  pub fn find_by_name(&self, name: &str) -> Vec<TargetId> {
    self
      .targets()
      .filter(|(_, target)| target.name == name)
      .map(|(id, _)| id)
      .collect()
  }

  /// Direct target dependencies of a target.
  pub fn target_dependencies(&self, id: TargetId) -> impl Iterator<Item = TargetId> + '_ {
    self.target(id).dependencies.iter().filter_map(|dep| match dep {
      Dependency::Target(dep_id) => Some(*dep_id),
      _ => None,
    })
  }
}

/// Incremental constructor for [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
  projects: Vec<Project>,
  targets: Vec<Target>,
  identities: HashMap<(PathBuf, String), TargetId>,
}

impl GraphBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_project(&mut self, project: Project) -> ProjectId {
    self.projects.push(project);
    ProjectId(self.projects.len() - 1)
  }

  /// Add a target to a project. Target names must be unique within a project.
  pub fn add_target(
    &mut self,
    project: ProjectId,
    name: impl Into<String>,
    inputs: TargetInputs,
  ) -> Result<TargetId, GraphError> {
    let name = name.into();
    let project_path = self
      .projects
      .get(project.0)
      .map(|p| p.path.clone())
      .ok_or(GraphError::UnknownProject(project))?;

    let key = (project_path, name.clone());
    if self.identities.contains_key(&key) {
      return Err(GraphError::DuplicateTarget {
        identity: format!("{}:{}", key.0.display(), key.1),
      });
    }

    let id = TargetId(self.targets.len());
    self.targets.push(Target {
      name,
      project,
      inputs,
      dependencies: Vec::new(),
    });
    self.identities.insert(key, id);
    Ok(id)
  }

  pub fn add_dependency(&mut self, from: TargetId, dependency: Dependency) -> Result<(), GraphError> {
    if let Dependency::Target(to) = &dependency
      && to.0 >= self.targets.len()
    {
      return Err(GraphError::UnknownTargetId(*to));
    }

    let target = self.targets.get_mut(from.0).ok_or(GraphError::UnknownTargetId(from))?;
    target.dependencies.push(dependency);
    Ok(())
  }

  pub fn lookup(&self, project_path: &Path, name: &str) -> Option<TargetId> {
    self
      .identities
      .get(&(project_path.to_path_buf(), name.to_string()))
      .copied()
  }

  pub fn build(self) -> Graph {
    Graph {
      projects: self.projects,
      targets: self.targets,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn project(path: &str, name: &str) -> Project {
    Project {
      path: PathBuf::from(path),
      name: name.to_string(),
      kind: ProjectKind::Local,
      settings: Settings::default(),
    }
  }

  #[test]
  fn builder_assigns_sequential_ids() {
    let mut builder = GraphBuilder::new();
    let p = builder.add_project(project("/app", "App"));
    let a = builder.add_target(p, "A", TargetInputs::default()).unwrap();
    let b = builder.add_target(p, "B", TargetInputs::default()).unwrap();
    builder.add_dependency(b, Dependency::Target(a)).unwrap();

    let graph = builder.build();
    assert_eq!(a, TargetId(0));
    assert_eq!(b, TargetId(1));
    assert_eq!(graph.target_dependencies(b).collect::<Vec<_>>(), vec![a]);
    assert_eq!(graph.identity(b), "/app:B");
  }

  #[test]
  fn duplicate_target_in_same_project_is_rejected() {
    let mut builder = GraphBuilder::new();
    let p = builder.add_project(project("/app", "App"));
    builder.add_target(p, "A", TargetInputs::default()).unwrap();

    let err = builder.add_target(p, "A", TargetInputs::default()).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateTarget { .. }));
  }

  #[test]
  fn same_name_in_different_projects_is_allowed() {
    let mut builder = GraphBuilder::new();
    let p1 = builder.add_project(project("/one", "One"));
    let p2 = builder.add_project(project("/two", "Two"));
    builder.add_target(p1, "Core", TargetInputs::default()).unwrap();
    builder.add_target(p2, "Core", TargetInputs::default()).unwrap();

    let graph = builder.build();
    assert_eq!(graph.find_by_name("Core").len(), 2);
    assert!(graph.find(Path::new("/two"), "Core").is_some());
  }

  #[test]
  fn dependency_on_unknown_target_is_rejected() {
    let mut builder = GraphBuilder::new();
    let p = builder.add_project(project("/app", "App"));
    let a = builder.add_target(p, "A", TargetInputs::default()).unwrap();

    let err = builder.add_dependency(a, Dependency::Target(TargetId(7))).unwrap_err();
    assert!(matches!(err, GraphError::UnknownTargetId(TargetId(7))));
  }
}
