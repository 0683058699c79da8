//! Hashing and resolution through the binary.

use serde_json::Value;

use super::common::{TestEnv, hashes_by_name};

fn sources(report: &Value) -> Vec<(String, String)> {
  report["items"]
    .as_object()
    .unwrap()
    .values()
    .map(|item| {
      (
        item["name"].as_str().unwrap().to_string(),
        item["source"].as_str().unwrap().to_string(),
      )
    })
    .collect()
}

#[test]
fn hashes_are_stable_across_runs() {
  let env = TestEnv::with_graph();

  let first = hashes_by_name(&env, &[]);
  let second = hashes_by_name(&env, &[]);

  assert_eq!(first.len(), 5);
  assert_eq!(first, second);
}

#[test]
fn source_change_propagates_to_dependents_only() {
  let env = TestEnv::with_graph();
  let before = hashes_by_name(&env, &[]);

  env.write_file("Support/Support.swift", "enum Support { case changed }");
  let after = hashes_by_name(&env, &[]);

  assert_ne!(before["Support"], after["Support"]);
  assert_ne!(before["Kit"], after["Kit"]);
  assert_ne!(before["App"], after["App"]);
  assert_eq!(before["Other"], after["Other"]);
  assert_eq!(before["Kit_Kit"], after["Kit_Kit"]);
}

#[test]
fn excluding_a_target_drops_its_resource_bundle() {
  let env = TestEnv::with_graph();

  let hashes = hashes_by_name(&env, &["-x", "Kit"]);

  assert!(!hashes.contains_key("Kit"));
  assert!(!hashes.contains_key("Kit_Kit"));
  assert!(hashes.contains_key("Support"));
  assert!(hashes.contains_key("App"));
}

#[test]
fn additional_strings_change_every_hash() {
  let env = TestEnv::with_graph();

  let plain = hashes_by_name(&env, &[]);
  let salted = hashes_by_name(&env, &["-a", "swift-6.0"]);

  for (name, hash) in &plain {
    assert_ne!(hash, &salted[name], "{} should change", name);
  }
}

#[test]
fn subhashes_are_included_on_request() {
  let env = TestEnv::with_graph();

  let plain = env.json(&["hash", "graph.json"]);
  let detailed = env.json(&["hash", "graph.json", "--subhashes"]);

  assert!(plain[0].get("subhashes").is_none());
  assert!(detailed[0]["subhashes"].is_object());
}

#[test]
fn empty_cache_misses_everything() {
  let env = TestEnv::with_graph();

  let report = env.json(&["resolve", "graph.json"]);

  let items = sources(&report);
  assert_eq!(items.len(), 5);
  assert!(items.iter().all(|(_, source)| source == "miss"));
  assert!(report["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn stored_artifact_resolves_locally() {
  let env = TestEnv::with_graph();
  env.write_file("build/Kit.framework", "Kit binary");

  env
    .cmd()
    .args(["store", "graph.json", "--target", "Kit", "--artifact", "build/Kit.framework"])
    .assert()
    .success();

  let report = env.json(&["resolve", "graph.json"]);
  let items = sources(&report);
  for (name, source) in items {
    let expected = if name == "Kit" { "local" } else { "miss" };
    assert_eq!(source, expected, "{}", name);
  }
}

#[test]
fn categories_do_not_share_artifacts() {
  let env = TestEnv::with_graph();
  env.write_file("build/Kit.framework", "Kit binary");

  env
    .cmd()
    .args(["store", "graph.json", "--target", "Kit", "--artifact", "build/Kit.framework"])
    .assert()
    .success();

  let report = env.json(&["resolve", "graph.json", "--category", "selective-tests"]);
  assert!(sources(&report).iter().all(|(_, source)| source == "miss"));
}

#[test]
fn editing_a_dependency_invalidates_the_stored_artifact() {
  let env = TestEnv::with_graph();
  env.write_file("build/Kit.framework", "Kit binary");

  env
    .cmd()
    .args(["store", "graph.json", "--target", "Kit", "--artifact", "build/Kit.framework"])
    .assert()
    .success();
  env.write_file("Support/Support.swift", "enum Support { case changed }");

  let report = env.json(&["resolve", "graph.json"]);
  assert!(sources(&report).iter().all(|(_, source)| source == "miss"));
}
