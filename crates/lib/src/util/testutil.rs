//! Test fixtures for stowage-lib.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::graph::{
  Dependency, Graph, GraphBuilder, Product, Project, ProjectKind, Settings, SourceFile, TargetId, TargetInputs,
};

/// A graph whose projects live in a temporary directory.
///
/// Targets and projects are recorded and only turned into a [`Graph`] by
/// [`Fixture::graph`], so files can be rewritten between hashing runs.
pub struct Fixture {
  root: PathBuf,
  _dir: Option<TempDir>,
  projects: Vec<(String, ProjectKind)>,
  targets: Vec<(String, String, TargetInputs)>,
  dependencies: Vec<(TargetId, Dependency)>,
}

impl Fixture {
  pub fn new() -> Self {
    let dir = TempDir::new().unwrap();
    Self {
      root: dir.path().to_path_buf(),
      _dir: Some(dir),
      projects: Vec::new(),
      targets: Vec::new(),
      dependencies: Vec::new(),
    }
  }

  /// A fixture over an existing directory that it does not own.
  pub fn at(root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
      _dir: None,
      projects: Vec::new(),
      targets: Vec::new(),
      dependencies: Vec::new(),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn project_with_kind(&mut self, name: &str, kind: ProjectKind) {
    if let Some(existing) = self.projects.iter_mut().find(|(n, _)| n == name) {
      existing.1 = kind;
    } else {
      self.projects.push((name.to_string(), kind));
    }
  }

  /// Write a file relative to a project directory.
  pub fn write(&self, project: &str, rel: &str, contents: &str) -> PathBuf {
    let path = self.root.join(project).join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
  }

  pub fn target(&mut self, project: &str, name: &str, inputs: TargetInputs) -> TargetId {
    if !self.projects.iter().any(|(n, _)| n == project) {
      self.projects.push((project.to_string(), ProjectKind::Local));
    }
    self.targets.push((project.to_string(), name.to_string(), inputs));
    TargetId(self.targets.len() - 1)
  }

  pub fn depend(&mut self, from: TargetId, to: TargetId) {
    self.dependencies.push((from, Dependency::Target(to)));
  }

  pub fn add_dependency(&mut self, from: TargetId, dependency: Dependency) {
    self.dependencies.push((from, dependency));
  }

  pub fn graph(&self) -> Graph {
    let mut builder = GraphBuilder::new();
    let project_ids: Vec<_> = self
      .projects
      .iter()
      .map(|(name, kind)| {
        builder.add_project(Project {
          path: self.root.join(name),
          name: name.clone(),
          kind: kind.clone(),
          settings: Settings::default(),
        })
      })
      .collect();

    for (project, name, inputs) in &self.targets {
      let idx = self.projects.iter().position(|(n, _)| n == project).unwrap();
      builder
        .add_target(project_ids[idx], name.clone(), inputs.clone())
        .unwrap();
    }
    for (from, dependency) in &self.dependencies {
      builder.add_dependency(*from, dependency.clone()).unwrap();
    }
    builder.build()
  }

  /// Framework inputs with the given source paths.
  pub fn framework(sources: &[&str]) -> TargetInputs {
    TargetInputs {
      product: Product::Framework,
      bundle_id: "dev.stowage.fixture".to_string(),
      platforms: vec!["ios".to_string()],
      sources: sources
        .iter()
        .map(|path| SourceFile {
          path: PathBuf::from(path),
          compiler_flags: None,
          content: None,
        })
        .collect(),
      ..Default::default()
    }
  }
}
