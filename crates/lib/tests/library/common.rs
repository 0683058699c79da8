//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use stowage_lib::cache::{CacheCoordinator, ResolveOptions, ResolveReport};
use stowage_lib::config::RemoteConfig;
use stowage_lib::graph::{Graph, load_graph};
use stowage_lib::hash::{ContentFingerprinter, GraphHasher, GraphHashes, HashOptions};
use stowage_lib::remote::HttpCacheClient;
use stowage_lib::store::DiskStore;
use stowage_lib::util::cancel::CancelToken;
use tempfile::TempDir;

pub const GRAPH: &str = r#"
{
  "projects": [
    {
      "path": "Support",
      "name": "Support",
      "targets": [
        { "name": "Support", "product": "framework", "bundle_id": "dev.stowage.support",
          "sources": [{ "path": "Sources/Support.swift" }] }
      ]
    },
    {
      "path": "Kit",
      "name": "Kit",
      "targets": [
        { "name": "Kit", "product": "framework", "bundle_id": "dev.stowage.kit",
          "sources": [{ "path": "Sources/Kit.swift" }],
          "dependencies": [{ "kind": "target", "name": "Support", "project": "Support" }] }
      ]
    }
  ]
}
"#;

/// A workspace with the Support/Kit graph on disk.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let ws = Self { temp };
    ws.write("Support/Sources/Support.swift", "enum Support {}");
    ws.write("Kit/Sources/Kit.swift", "enum Kit {}");
    ws.write("graph.json", GRAPH);
    ws
  }

  pub fn write(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn graph(&self) -> Arc<Graph> {
    Arc::new(load_graph(&self.temp.path().join("graph.json")).unwrap())
  }

  /// Hashes keyed by target name.
  pub async fn hashes(&self, graph: &Arc<Graph>) -> GraphHashes {
    GraphHasher::new(ContentFingerprinter::new(), 2)
      .hash(graph.clone(), &HashOptions::default(), &CancelToken::new())
      .await
      .unwrap()
  }
}

pub fn signing_key() -> SigningKey {
  SigningKey::from_bytes(&[42u8; 32])
}

pub fn verifying_key() -> String {
  STANDARD.encode(signing_key().verifying_key().to_bytes())
}

pub fn sign(hash: &str) -> String {
  STANDARD.encode(signing_key().sign(hash.as_bytes()).to_bytes())
}

pub fn coordinator(store: &Path, server_url: String) -> CacheCoordinator<DiskStore, HttpCacheClient> {
  let mut config = RemoteConfig::new(server_url, "acme/app");
  config.token = Some("token".to_string());
  config.verifying_key = Some(verifying_key());
  let http = HttpCacheClient::http_client(&config).unwrap();
  let client = HttpCacheClient::new(http, &config).unwrap();
  CacheCoordinator::new(DiskStore::new(store), Some(client)).with_parallelism(2)
}

pub async fn resolve(
  coordinator: &CacheCoordinator<DiskStore, HttpCacheClient>,
  graph: &Arc<Graph>,
  hashes: GraphHashes,
) -> ResolveReport {
  coordinator
    .resolve(graph, hashes, &ResolveOptions::default(), &CancelToken::new())
    .await
    .unwrap()
}
