use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use stowage_lib::cache::{CacheCategory, CacheSource, ResolveOptions};

use super::{coordinator, hash_options, hasher, load, load_config, runtime};
use crate::GraphArgs;
use crate::output::{OutputFormat, format_duration, print_item, print_json, print_stat, print_success, print_warning};

pub fn cmd_resolve(
  config: Option<&Path>,
  args: &GraphArgs,
  category: CacheCategory,
  offline: bool,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();
  let config = load_config(config)?;
  let graph = load(args)?;
  let coordinator = coordinator(&config)?;
  let options = ResolveOptions { category, offline };

  let (rt, cancel) = runtime()?;
  let report = rt
    .block_on(coordinator.run(graph, &hasher(&config), &hash_options(args), &options, &cancel))
    .context("Cache resolution failed")?;

  if output.is_json() {
    return print_json(&report);
  }

  for item in report.items.values() {
    print_item(item.source, &item.name, &item.hash);
  }
  for warning in &report.warnings {
    print_warning(&warning.to_string());
  }

  println!();
  print_success(&format!("Resolved {} target(s)", report.items.len()));
  print_stat("Local hits", &report.count(CacheSource::Local).to_string());
  print_stat("Remote hits", &report.count(CacheSource::Remote).to_string());
  print_stat("Misses", &report.count(CacheSource::Miss).to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
