mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use stowage_lib::cache::CacheCategory;
use tracing_subscriber::EnvFilter;

use cmd::{cmd_gc, cmd_hash, cmd_resolve, cmd_store};
use output::{OutputFormat, print_error};

/// stowage - content-addressed build artifact cache
#[derive(Parser)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to a stowage.toml (default: ./stowage.toml, then the user config dir)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Options shared by every command that hashes a graph.
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
  /// Path to the graph JSON document
  pub graph: PathBuf,

  /// Target to leave out, together with its resource bundle (repeatable)
  #[arg(short = 'x', long = "exclude", value_name = "NAME")]
  pub exclude: Vec<String>,

  /// Extra string folded into every hash, e.g. a toolchain version (repeatable)
  #[arg(short = 'a', long = "additional", value_name = "STRING")]
  pub additional: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the content hash of every target
  Hash {
    #[command(flatten)]
    graph: GraphArgs,

    /// Include per-category subhashes
    #[arg(long)]
    subhashes: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Resolve every target against the local and remote cache
  Resolve {
    #[command(flatten)]
    graph: GraphArgs,

    /// Artifact category to resolve
    #[arg(long, default_value = "binaries")]
    category: CacheCategory,

    /// Only consult the local cache
    #[arg(long)]
    offline: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Store a freshly built artifact for a target
  Store {
    #[command(flatten)]
    graph: GraphArgs,

    /// Name of the target the artifact was built for
    #[arg(short, long)]
    target: String,

    /// Path to the built artifact
    #[arg(long)]
    artifact: PathBuf,

    /// Artifact category
    #[arg(long, default_value = "binaries")]
    category: CacheCategory,

    /// How long the build took (e.g., "90s", "2m")
    #[arg(long, value_parser = humantime::parse_duration)]
    build_duration: Option<Duration>,

    /// Store locally only
    #[arg(long)]
    no_upload: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Evict old or excess entries from the local cache
  Gc {
    /// Evict entries not accessed for this long (e.g., "7d", "24h")
    #[arg(long, value_parser = humantime::parse_duration)]
    max_age: Option<Duration>,

    /// Shrink the cache below this many bytes, least recently used first
    #[arg(long)]
    max_size: Option<u64>,

    /// Preview what would be evicted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_filter = if cli.verbose { "stowage_cli=debug,stowage_lib=debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = cli.config.as_deref();
  match cli.command {
    Commands::Hash {
      graph,
      subhashes,
      output,
    } => cmd_hash(config, &graph, subhashes, output),
    Commands::Resolve {
      graph,
      category,
      offline,
      output,
    } => cmd_resolve(config, &graph, category, offline, output),
    Commands::Store {
      graph,
      target,
      artifact,
      category,
      build_duration,
      no_upload,
      output,
    } => cmd_store(
      config,
      &graph,
      cmd::StoreArgs {
        target,
        artifact,
        category,
        build_duration,
        upload: !no_upload,
      },
      output,
    ),
    Commands::Gc {
      max_age,
      max_size,
      dry_run,
      output,
    } => cmd_gc(config, max_age, max_size, dry_run, output),
  }
}
