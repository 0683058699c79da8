//! Store on one machine, resolve on another, through the HTTP cache service.

use std::fs;

use mockito::{Matcher, Server};
use stowage_lib::cache::{CacheCategory, CacheSource, CacheStage, StoreRequest};
use stowage_lib::graph::TargetId;
use tempfile::TempDir;

use super::common::{Workspace, coordinator, resolve, sign};

fn with_hash(hash: &str) -> Matcher {
  Matcher::AllOf(vec![
    Matcher::UrlEncoded("project_id".into(), "acme/app".into()),
    Matcher::UrlEncoded("hash".into(), hash.into()),
    Matcher::UrlEncoded("cache_category".into(), "binaries".into()),
  ])
}

fn target(graph: &stowage_lib::graph::Graph, name: &str) -> TargetId {
  graph.find_by_name(name)[0]
}

#[tokio::test]
async fn artifact_stored_on_one_machine_is_downloaded_on_another() {
  let ws = Workspace::new();
  let graph = ws.graph();
  let hashes = ws.hashes(&graph).await;
  let support = target(&graph, "Support");
  let kit = target(&graph, "Kit");
  let support_hash = hashes[&support].hash.clone();
  let kit_hash = hashes[&kit].hash.clone();

  let mut server = Server::new_async().await;
  let storage_url = format!("{}/storage/{}", server.url(), kit_hash);

  server
    .mock("HEAD", "/api/cache")
    .match_query(with_hash(&support_hash))
    .with_status(404)
    .expect_at_least(1)
    .create_async()
    .await;

  // Machine A builds Kit and stores it.
  let kit_absent = server
    .mock("HEAD", "/api/cache")
    .match_query(with_hash(&kit_hash))
    .with_status(404)
    .create_async()
    .await;
  let upload = server
    .mock("POST", "/api/cache/upload")
    .match_query(with_hash(&kit_hash))
    .match_header("authorization", "Bearer token")
    .with_status(200)
    .with_body(format!(r#"{{"url": "{}"}}"#, storage_url))
    .create_async()
    .await;
  let put = server
    .mock("PUT", format!("/storage/{}", kit_hash).as_str())
    .match_body("Kit.framework")
    .with_status(200)
    .create_async()
    .await;

  let machine_a = TempDir::new().unwrap();
  let built = ws.write("build/Kit.framework", "Kit.framework");
  let outcome = coordinator(machine_a.path(), server.url())
    .store(StoreRequest {
      target: kit,
      name: "Kit".to_string(),
      hash: kit_hash.clone(),
      category: CacheCategory::Binaries,
      source: built,
      build_duration: None,
    })
    .await
    .unwrap();
  assert!(outcome.uploaded);
  kit_absent.assert_async().await;
  upload.assert_async().await;
  put.assert_async().await;
  kit_absent.remove_async().await;

  // Machine B resolves the same graph with an empty local store.
  server
    .mock("HEAD", "/api/cache")
    .match_query(with_hash(&kit_hash))
    .with_status(200)
    .create_async()
    .await;
  server
    .mock("GET", "/api/cache")
    .match_query(with_hash(&kit_hash))
    .with_status(200)
    .with_header("x-cache-signature", &sign(&kit_hash))
    .with_body(format!(r#"{{"url": "{}", "expires_at": 4102444800}}"#, storage_url))
    .create_async()
    .await;
  let download = server
    .mock("GET", format!("/storage/{}", kit_hash).as_str())
    .with_status(200)
    .with_body("Kit.framework")
    .expect(1)
    .create_async()
    .await;

  let machine_b = TempDir::new().unwrap();
  let coordinator_b = coordinator(machine_b.path(), server.url());
  let report = resolve(&coordinator_b, &graph, hashes.clone()).await;

  assert_eq!(report.items[&support].source, CacheSource::Miss);
  let item = &report.items[&kit];
  assert_eq!(item.source, CacheSource::Remote);
  let artifact = item.artifact.as_ref().unwrap();
  assert!(artifact.starts_with(machine_b.path()));
  assert_eq!(fs::read_to_string(artifact).unwrap(), "Kit.framework");
  assert!(report.warnings.is_empty());

  // A second run on machine B never downloads again.
  let again = resolve(&coordinator_b, &graph, hashes).await;
  assert_eq!(again.items[&kit].source, CacheSource::Local);
  download.assert_async().await;
}

#[tokio::test]
async fn response_signed_with_another_key_is_not_trusted() {
  let ws = Workspace::new();
  let graph = ws.graph();
  let hashes = ws.hashes(&graph).await;
  let kit = target(&graph, "Kit");
  let kit_hash = hashes[&kit].hash.clone();

  let mut server = Server::new_async().await;
  let storage_url = format!("{}/storage/{}", server.url(), kit_hash);

  server
    .mock("HEAD", "/api/cache")
    .match_query(Matcher::Any)
    .with_status(200)
    .expect_at_least(1)
    .create_async()
    .await;
  // Signed over a different hash.
  server
    .mock("GET", "/api/cache")
    .match_query(Matcher::Any)
    .with_status(200)
    .with_header("x-cache-signature", &sign("0000"))
    .with_body(format!(r#"{{"url": "{}"}}"#, storage_url))
    .expect_at_least(1)
    .create_async()
    .await;
  let download = server
    .mock("GET", Matcher::Regex(r"^/storage/".to_string()))
    .with_status(200)
    .expect(0)
    .create_async()
    .await;

  let store = TempDir::new().unwrap();
  let report = resolve(&coordinator(store.path(), server.url()), &graph, hashes).await;

  assert_eq!(report.items[&kit].source, CacheSource::Miss);
  assert!(
    report
      .warnings
      .iter()
      .any(|w| w.target == kit && w.stage == CacheStage::Download)
  );
  download.assert_async().await;
}
