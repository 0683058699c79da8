use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use stowage_lib::store::{EvictionPolicy, evict};

use super::load_config;
use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

/// Evict entries from the local cache. Limits not given on the command line
/// fall back to the `[gc]` section of the configuration.
pub fn cmd_gc(
  config: Option<&Path>,
  max_age: Option<Duration>,
  max_size: Option<u64>,
  dry_run: bool,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();
  let config = load_config(config)?;

  let policy = EvictionPolicy {
    max_age: max_age.or(config.gc.max_age_secs.map(Duration::from_secs)),
    max_size: max_size.or(config.gc.max_size_bytes),
    dry_run,
  };

  let report = evict(&config.cache_dir, &policy).context("Cache eviction failed")?;

  if output.is_json() {
    print_json(&report)?;
  } else {
    println!();
    if dry_run {
      print_info("Dry run - no changes made");
    } else {
      print_success("Cache eviction complete!");
    }
    print_stat("Entries scanned", &report.scanned.to_string());
    print_stat("Entries evicted", &report.evicted.len().to_string());
    print_stat("Space freed", &format_bytes(report.bytes_freed));
    print_stat("Space remaining", &format_bytes(report.bytes_remaining));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
