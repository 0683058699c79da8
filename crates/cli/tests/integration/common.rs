//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const GRAPH: &str = r#"
{
  "projects": [
    {
      "path": "Support",
      "name": "Support",
      "targets": [
        { "name": "Support", "product": "framework", "bundle_id": "dev.stowage.support",
          "sources": [{ "path": "Support.swift" }] }
      ]
    },
    {
      "path": "Kit",
      "name": "Kit",
      "targets": [
        { "name": "Kit", "product": "framework", "bundle_id": "dev.stowage.kit",
          "sources": [{ "path": "Kit.swift" }],
          "dependencies": [{ "kind": "target", "name": "Support", "project": "Support" }] },
        { "name": "Kit_Kit", "product": "bundle", "bundle_id": "dev.stowage.kit.resources",
          "resources": [{ "path": "Kit.xcassets" }] }
      ]
    },
    {
      "path": "App",
      "name": "App",
      "targets": [
        { "name": "App", "product": "app", "bundle_id": "dev.stowage.app",
          "sources": [{ "path": "App.swift" }],
          "dependencies": [{ "kind": "target", "name": "Kit", "project": "Kit" }] }
      ]
    },
    {
      "path": "Other",
      "name": "Other",
      "targets": [
        { "name": "Other", "product": "framework", "bundle_id": "dev.stowage.other",
          "sources": [{ "path": "Other.swift" }] }
      ]
    }
  ]
}
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the graph, its sources,
/// the local cache and the config directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// The Support/Kit/App/Other graph with its sources on disk.
  pub fn with_graph() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("Support/Support.swift", "enum Support {}");
    env.write_file("Kit/Kit.swift", "enum Kit {}");
    env.write_file("Kit/Kit.xcassets/Contents.json", "{}");
    env.write_file("App/App.swift", "@main struct App {}");
    env.write_file("Other/Other.swift", "enum Other {}");
    env.write_file("graph.json", GRAPH);
    env
  }

  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn cache_path(&self) -> PathBuf {
    self.temp.path().join("cache")
  }

  /// A stowage command running inside the environment, without a remote.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("stowage");
    cmd
      .current_dir(self.temp.path())
      .env("XDG_CONFIG_HOME", self.temp.path().join("config"))
      .env("STOWAGE_CACHE_DIR", self.cache_path())
      .env_remove("STOWAGE_URL")
      .env_remove("STOWAGE_PROJECT")
      .env_remove("STOWAGE_TOKEN")
      .env_remove("STOWAGE_VERIFYING_KEY")
      .env_remove("RUST_LOG");
    cmd
  }

  /// Run a command with `-o json` and parse its output.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.cmd().args(args).args(["-o", "json"]).output().unwrap();
    assert!(
      output.status.success(),
      "stowage {:?} failed: {}",
      args,
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}

/// Hashes from `stowage hash -o json`, keyed by target name.
pub fn hashes_by_name(env: &TestEnv, extra: &[&str]) -> std::collections::BTreeMap<String, String> {
  let mut args = vec!["hash", "graph.json"];
  args.extend_from_slice(extra);
  env
    .json(&args)
    .as_array()
    .unwrap()
    .iter()
    .map(|t| {
      (
        t["name"].as_str().unwrap().to_string(),
        t["hash"].as_str().unwrap().to_string(),
      )
    })
    .collect()
}
