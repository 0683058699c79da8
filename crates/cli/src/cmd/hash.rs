use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use stowage_lib::graph::TargetId;
use stowage_lib::hash::Subhashes;

use super::{hash_options, hasher, load, load_config, runtime};
use crate::GraphArgs;
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, short_hash};

#[derive(Debug, Serialize)]
struct HashedTarget {
  id: TargetId,
  project: String,
  name: String,
  hash: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  subhashes: Option<Subhashes>,
}

pub fn cmd_hash(config: Option<&Path>, args: &GraphArgs, subhashes: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let config = load_config(config)?;
  let graph = load(args)?;

  let (rt, cancel) = runtime()?;
  let hashes = rt
    .block_on(hasher(&config).hash(graph.clone(), &hash_options(args), &cancel))
    .context("Hashing failed")?;

  let targets: Vec<HashedTarget> = hashes
    .into_iter()
    .map(|(id, content)| {
      let target = graph.target(id);
      HashedTarget {
        id,
        project: graph.project(target.project).name.clone(),
        name: target.name.clone(),
        hash: content.hash,
        subhashes: subhashes.then_some(content.subhashes),
      }
    })
    .collect();

  if output.is_json() {
    return print_json(&targets);
  }

  for target in &targets {
    println!("{}  {}/{}", target.hash, target.project, target.name);
    if let Some(subhashes) = &target.subhashes {
      for (label, value) in subhashes.labelled() {
        println!("    {:<24} {}", label, short_hash(value));
      }
    }
  }
  println!();
  print_info(&format!("Hashed {} target(s)", targets.len()));
  print_stat("Excluded", &(graph.target_count() - targets.len()).to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
