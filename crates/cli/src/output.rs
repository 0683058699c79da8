//! Terminal output for the stowage commands.
//!
//! Status lines go to stdout, problems to stderr; both are colored only when
//! the stream is a terminal.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};
use stowage_lib::cache::CacheSource;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leading marker of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
  Success,
  Error,
  Warning,
  Info,
}

impl Marker {
  fn glyph(self) -> &'static str {
    match self {
      Marker::Success => "✓",
      Marker::Error => "✗",
      Marker::Warning => "⚠",
      Marker::Info => "•",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Marker::Success => AnsiColors::Green,
      Marker::Error => AnsiColors::Red,
      Marker::Warning => AnsiColors::Yellow,
      Marker::Info => AnsiColors::Blue,
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Marker::Error | Marker::Warning)
  }
}

fn status(marker: Marker, message: &str) {
  let color = marker.color();
  if marker.to_stderr() {
    eprintln!(
      "{} {}",
      marker.glyph().if_supports_color(Stream::Stderr, move |s| s.color(color)),
      message.if_supports_color(Stream::Stderr, move |s| s.color(color))
    );
  } else {
    println!(
      "{} {}",
      marker.glyph().if_supports_color(Stream::Stdout, move |s| s.color(color)),
      message
    );
  }
}

pub fn print_success(message: &str) {
  status(Marker::Success, message);
}

pub fn print_error(message: &str) {
  status(Marker::Error, message);
}

pub fn print_warning(message: &str) {
  status(Marker::Warning, message);
}

pub fn print_info(message: &str) {
  status(Marker::Info, message);
}

/// An indented `label: value` line under a status line.
pub fn print_stat(label: &str, value: impl Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

fn source_marker(source: CacheSource) -> (&'static str, AnsiColors) {
  match source {
    CacheSource::Local => ("●", AnsiColors::Green),
    CacheSource::Remote => ("↓", AnsiColors::Cyan),
    CacheSource::Miss => ("○", AnsiColors::Yellow),
  }
}

/// One resolved target: where it came from, its name and short hash.
pub fn print_item(source: CacheSource, name: &str, hash: &str) {
  let (glyph, color) = source_marker(source);
  println!(
    "  {} {:<32} {} {}",
    glyph.if_supports_color(Stream::Stdout, move |s| s.color(color)),
    name,
    short_hash(hash).if_supports_color(Stream::Stdout, |s| s.dimmed()),
    source
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// First 12 hex digits, enough to tell entries apart on screen.
pub fn short_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }

  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Durations rounded to whole milliseconds, e.g. `2m 5s` or `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}
