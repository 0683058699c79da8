//! Local cache eviction through the binary.

use predicates::prelude::*;

use super::common::TestEnv;

fn store_kit(env: &TestEnv) -> String {
  env.write_file("build/Kit.framework", "Kit binary");
  let outcome = env.json(&["store", "graph.json", "-t", "Kit", "--artifact", "build/Kit.framework"]);
  outcome["artifact"].as_str().unwrap().to_string()
}

#[test]
fn gc_with_no_store_succeeds() {
  let env = TestEnv::empty();

  env
    .cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Cache eviction complete"));
}

#[test]
fn gc_without_limits_keeps_everything() {
  let env = TestEnv::with_graph();
  let artifact = store_kit(&env);

  let report = env.json(&["gc"]);

  assert_eq!(report["scanned"], 1);
  assert!(report["evicted"].as_array().unwrap().is_empty());
  assert!(std::path::Path::new(&artifact).exists());
}

#[test]
fn gc_dry_run_shows_what_would_be_removed() {
  let env = TestEnv::with_graph();
  let artifact = store_kit(&env);

  let report = env.json(&["gc", "--max-size", "0", "--dry-run"]);

  assert_eq!(report["dry_run"], true);
  assert_eq!(report["evicted"].as_array().unwrap().len(), 1);
  assert!(std::path::Path::new(&artifact).exists());
}

#[test]
fn gc_max_size_evicts_entries() {
  let env = TestEnv::with_graph();
  let artifact = store_kit(&env);

  let report = env.json(&["gc", "--max-size", "0"]);

  assert_eq!(report["evicted"].as_array().unwrap().len(), 1);
  assert!(!std::path::Path::new(&artifact).exists());

  let resolved = env.json(&["resolve", "graph.json"]);
  assert!(
    resolved["items"]
      .as_object()
      .unwrap()
      .values()
      .all(|item| item["source"] == "miss")
  );
}

#[test]
fn gc_limits_fall_back_to_configuration() {
  let env = TestEnv::with_graph();
  let artifact = store_kit(&env);
  env.write_file("stowage.toml", "[gc]\nmax_size_bytes = 0\n");

  let report = env.json(&["gc"]);

  assert_eq!(report["evicted"].as_array().unwrap().len(), 1);
  assert!(!std::path::Path::new(&artifact).exists());
}
