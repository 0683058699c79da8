//! Storing artifacts through the binary.

use predicates::prelude::*;

use super::common::{TestEnv, hashes_by_name};

#[test]
fn store_reports_hash_and_location() {
  let env = TestEnv::with_graph();
  env.write_file("build/App.app", "App binary");
  let hashes = hashes_by_name(&env, &[]);

  let outcome = env.json(&[
    "store",
    "graph.json",
    "--target",
    "App",
    "--artifact",
    "build/App.app",
    "--build-duration",
    "90s",
  ]);

  assert_eq!(outcome["name"], "App");
  assert_eq!(outcome["hash"].as_str().unwrap(), hashes["App"]);
  assert_eq!(outcome["uploaded"], false);
  let artifact = outcome["artifact"].as_str().unwrap();
  assert!(artifact.starts_with(env.cache_path().to_str().unwrap()));
  assert_eq!(std::fs::read_to_string(artifact).unwrap(), "App binary");
}

#[test]
fn store_text_output_mentions_target() {
  let env = TestEnv::with_graph();
  env.write_file("build/Other.framework", "Other binary");

  env
    .cmd()
    .args(["store", "graph.json", "-t", "Other", "--artifact", "build/Other.framework", "--no-upload"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Stored Other"))
    .stdout(predicate::str::contains("Uploaded: no"));
}

#[test]
fn storing_an_excluded_target_fails() {
  let env = TestEnv::with_graph();
  env.write_file("build/Kit.framework", "Kit binary");

  env
    .cmd()
    .args(["store", "graph.json", "-x", "Kit", "-t", "Kit", "--artifact", "build/Kit.framework"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("excluded"));
}

#[test]
fn ambiguous_target_name_fails() {
  let env = TestEnv::with_graph();
  env.write_file(
    "graph.json",
    r#"{ "projects": [
      { "path": "A", "name": "A", "targets": [{ "name": "Shared" }] },
      { "path": "B", "name": "B", "targets": [{ "name": "Shared" }] }
    ] }"#,
  );
  env.write_file("build/Shared.framework", "Shared binary");

  env
    .cmd()
    .args(["store", "graph.json", "-t", "Shared", "--artifact", "build/Shared.framework"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ambiguous"));
}
