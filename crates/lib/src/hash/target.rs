//! Per-target content hashing.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::HashError;
use super::fingerprint::{FileInput, FingerprintError, Fingerprinter};
use super::subhash::Subhashes;
use crate::graph::{Dependency, Graph, InfoPlist, LinkStatus, Linking, Project, Target, TargetId};
use crate::util::hash::{hash_bytes, hash_lines};

/// The content hash of a target together with the fingerprints it was folded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContentHash {
  pub hash: String,
  pub subhashes: Subhashes,
}

pub struct TargetHasher<F> {
  fingerprinter: F,
}

impl<F: Fingerprinter> TargetHasher<F> {
  pub fn new(fingerprinter: F) -> Self {
    Self { fingerprinter }
  }

  /// Hash one target.
  ///
  /// `dependency_hashes` must hold the content hash of every target dependency
  /// that is not in `excluded`. Edges to excluded targets are dropped.
  pub fn hash(
    &self,
    graph: &Graph,
    id: TargetId,
    dependency_hashes: &HashMap<TargetId, String>,
    excluded: &HashSet<TargetId>,
    additional_strings: &[String],
  ) -> Result<TargetContentHash, HashError> {
    let subhashes = self.subhashes(graph, id, dependency_hashes, excluded, additional_strings)?;
    let hash = content_hash(graph.target(id), &subhashes);
    Ok(TargetContentHash { hash, subhashes })
  }

  pub fn subhashes(
    &self,
    graph: &Graph,
    id: TargetId,
    dependency_hashes: &HashMap<TargetId, String>,
    excluded: &HashSet<TargetId>,
    additional_strings: &[String],
  ) -> Result<Subhashes, HashError> {
    let target = graph.target(id);
    let project = graph.project(target.project);
    let wrap = |source: FingerprintError| HashError::Fingerprint {
      target: graph.identity(id),
      source,
    };

    let mut subhashes = Subhashes {
      dependencies: self.dependencies(graph, id, dependency_hashes, excluded)?,
      environment: self.fingerprinter.strings(&key_values(&target.inputs.environment)),
      deployment_target: self.fingerprinter.strings(&key_values(&target.inputs.deployment_targets)),
      project_settings: self.fingerprinter.settings(&project.settings, &project.path).map_err(wrap)?,
      target_settings: target
        .inputs
        .settings
        .as_ref()
        .map(|settings| self.fingerprinter.settings(settings, &project.path))
        .transpose()
        .map_err(wrap)?,
      additional_strings: additional_strings.to_vec(),
      external: project.external_hash().map(str::to_string),
      ..Default::default()
    };

    // Packages resolved with a precomputed hash are not fingerprinted file by file.
    if subhashes.external.is_none() {
      self.file_categories(graph, id, project, target, &mut subhashes).map_err(wrap)?;
    }

    Ok(subhashes)
  }

  fn file_categories(
    &self,
    graph: &Graph,
    id: TargetId,
    project: &Project,
    target: &Target,
    subhashes: &mut Subhashes,
  ) -> Result<(), FingerprintError> {
    let inputs = &target.inputs;
    let fp = &self.fingerprinter;

    let sources: Vec<FileInput> = inputs
      .sources
      .iter()
      .map(|source| {
        let key = key_of(&source.path);
        let input = match &source.content {
          Some(content) => FileInput::inline(key, content.as_bytes()),
          None => FileInput::disk(key, project.resolve(&source.path)),
        };
        input.with_attributes(source.compiler_flags.iter().map(|flags| format!("flags={}", flags)))
      })
      .collect();
    subhashes.sources = fp.files(&sources)?;

    let resources: Vec<FileInput> = inputs
      .resources
      .iter()
      .map(|resource| {
        let mut tags = resource.tags.clone();
        tags.sort();
        FileInput::disk(key_of(&resource.path), project.resolve(&resource.path))
          .with_attributes(tags.into_iter().map(|tag| format!("tag={}", tag)))
      })
      .collect();
    subhashes.resources = fp.files(&resources)?;

    let mut copy_files = Vec::with_capacity(inputs.copy_files.len());
    for action in &inputs.copy_files {
      let files: Vec<FileInput> = action
        .files
        .iter()
        .map(|file| FileInput::disk(key_of(file), project.resolve(file)))
        .collect();
      copy_files.push(hash_lines([
        format!("name={:?}", action.name),
        format!("destination={:?}", action.destination),
        format!("subpath={:?}", action.subpath),
        format!("files={}", fp.files(&files)?.unwrap_or_default()),
      ]));
    }
    subhashes.copy_files = in_order(&copy_files);

    let models: Vec<FileInput> = inputs
      .core_data_models
      .iter()
      .map(|model| {
        FileInput::disk(key_of(&model.path), project.resolve(&model.path))
          .with_attributes([format!("current_version={}", model.current_version)])
      })
      .collect();
    subhashes.core_data_models = fp.files(&models)?;

    let mut scripts = Vec::with_capacity(inputs.scripts.len());
    for script in &inputs.scripts {
      let body = match (&script.inline, &script.path) {
        (Some(inline), _) => hash_bytes(inline.as_bytes()),
        (None, Some(path)) => fp.path(&project.resolve(path))?,
        (None, None) => String::new(),
      };
      let mut script_inputs = script
        .input_paths
        .iter()
        .map(|path| script_input(fp, project, path))
        .collect::<Result<Vec<_>, _>>()?;
      script_inputs.sort();
      scripts.push(hash_lines([
        format!("name={:?}", script.name),
        format!("order={:?}", script.order),
        format!("body={}", body),
        format!("inputs={:?}", script_inputs),
        format!("outputs={:?}", sorted_keys(&script.output_paths)),
      ]));
    }
    subhashes.target_scripts = in_order(&scripts);

    if let Some(headers) = inputs.headers.as_ref().filter(|h| !h.is_empty()) {
      let scoped = [
        ("public", &headers.public),
        ("private", &headers.private),
        ("project", &headers.project),
      ];
      let files: Vec<FileInput> = scoped
        .iter()
        .flat_map(|(scope, paths)| {
          paths
            .iter()
            .map(move |path| FileInput::disk(format!("{}:{}", scope, key_of(path)), project.resolve(path)))
        })
        .collect();
      subhashes.headers = fp.files(&files)?;
    }

    subhashes.info_plist = match &inputs.info_plist {
      Some(InfoPlist::File { path }) => Some(fp.path(&project.resolve(path))?),
      Some(InfoPlist::Dictionary { dictionary }) => {
        let json = serde_json::to_string(dictionary)
          .map_err(|e| FingerprintError::MalformedSettings(format!("info plist of {}: {}", graph.identity(id), e)))?;
        Some(hash_bytes(json.as_bytes()))
      }
      None => None,
    };

    subhashes.entitlements = inputs
      .entitlements
      .as_ref()
      .map(|path| fp.path(&project.resolve(path)))
      .transpose()?;

    let folders: Vec<FileInput> = inputs
      .buildable_folders
      .iter()
      .map(|folder| FileInput::disk(key_of(folder), project.resolve(folder)))
      .collect();
    subhashes.buildable_folders = fp.files(&folders)?;

    Ok(())
  }

  /// Fold `(identity, hash)` entries of the target's dependencies, sorted by identity.
  fn dependencies(
    &self,
    graph: &Graph,
    id: TargetId,
    dependency_hashes: &HashMap<TargetId, String>,
    excluded: &HashSet<TargetId>,
  ) -> Result<Option<String>, HashError> {
    let wrap = |source: FingerprintError| HashError::Fingerprint {
      target: graph.identity(id),
      source,
    };

    let mut entries: Vec<(String, String)> = Vec::new();
    for dependency in &graph.target(id).dependencies {
      let entry = match dependency {
        Dependency::Target(dep) => {
          if excluded.contains(dep) {
            continue;
          }
          let hash = dependency_hashes
            .get(dep)
            .ok_or_else(|| HashError::MissingDependencyHash {
              target: graph.identity(id),
              dependency: graph.identity(*dep),
            })?;
          let dep_target = graph.target(*dep);
          (
            format!("target:{}/{}", graph.project(dep_target.project).name, dep_target.name),
            hash.clone(),
          )
        }
        Dependency::Framework { path, status } => (
          format!("framework:{}", file_name(path)),
          format!("{}:{}", self.fingerprinter.path(path).map_err(wrap)?, status_str(*status)),
        ),
        Dependency::XcFramework { path, status } => (
          format!("xcframework:{}", file_name(path)),
          format!("{}:{}", self.fingerprinter.path(path).map_err(wrap)?, status_str(*status)),
        ),
        Dependency::Library { path, linking } => (
          format!("library:{}", file_name(path)),
          format!("{}:{}", self.fingerprinter.path(path).map_err(wrap)?, linking_str(*linking)),
        ),
        Dependency::Package { product } => (format!("package:{}", product), product.clone()),
        Dependency::Sdk { name, status } => (format!("sdk:{}", name), format!("{}:{}", name, status_str(*status))),
      };
      entries.push(entry);
    }

    if entries.is_empty() {
      return Ok(None);
    }

    entries.sort();
    entries.dedup();
    Ok(Some(hash_lines(
      entries.iter().map(|(identity, hash)| format!("{}={}", identity, hash)),
    )))
  }
}

/// Fold identity attributes and subhashes into the final content hash.
fn content_hash(target: &Target, subhashes: &Subhashes) -> String {
  let inputs = &target.inputs;
  let mut platforms = inputs.platforms.clone();
  platforms.sort();

  let mut lines = vec![
    format!("name={}", target.name),
    format!("product={}", inputs.product),
    format!("bundle_id={}", inputs.bundle_id),
  ];
  if let Some(product_name) = &inputs.product_name {
    lines.push(format!("product_name={}", product_name));
  }
  lines.push(format!("platforms={}", platforms.join(",")));

  for (label, value) in subhashes.labelled() {
    lines.push(format!("{}={}", label, value));
  }
  for additional in &subhashes.additional_strings {
    lines.push(format!("additional={}", additional));
  }
  if let Some(external) = &subhashes.external {
    lines.push(format!("external={}", external));
  }

  hash_lines(lines)
}

/// Build phases run in declaration order, so their fingerprints keep it.
fn in_order(phases: &[String]) -> Option<String> {
  if phases.is_empty() {
    None
  } else {
    Some(hash_lines(phases))
  }
}

/// A script input is hashed by content. Paths that still hold a build
/// variable such as `$(SRCROOT)` cannot be read here and count by name.
fn script_input<F: Fingerprinter>(fp: &F, project: &Project, path: &Path) -> Result<String, FingerprintError> {
  let key = key_of(path);
  if key.contains("$(") {
    return Ok(key);
  }
  Ok(format!("{}:{}", key, fp.path(&project.resolve(path))?))
}

fn key_of(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}

fn sorted_keys(paths: &[std::path::PathBuf]) -> Vec<String> {
  let mut keys: Vec<String> = paths.iter().map(|p| key_of(p)).collect();
  keys.sort();
  keys
}

fn key_values(map: &std::collections::BTreeMap<String, String>) -> Vec<String> {
  map.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().to_string())
    .unwrap_or_else(|| key_of(path))
}

fn status_str(status: LinkStatus) -> &'static str {
  match status {
    LinkStatus::Required => "required",
    LinkStatus::Optional => "optional",
  }
}

fn linking_str(linking: Linking) -> &'static str {
  match linking {
    Linking::Static => "static",
    Linking::Dynamic => "dynamic",
  }
}
