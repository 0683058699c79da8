//! Category fingerprints.
//!
//! A fingerprint is a SHA-256 digest over one input category of a target.
//! Inputs are sorted by their canonical key before hashing, so declaration
//! order never matters, and file contents are hashed directly. A category
//! with no inputs has no fingerprint at all, which keeps "absent" distinct
//! from "present but empty".

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::graph::{SettingValue, Settings};
use crate::util::hash::{self, DigestError};

#[derive(Debug, Error)]
pub enum FingerprintError {
  #[error("failed to read {path}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: DigestError,
  },

  #[error("malformed settings: {0}")]
  MalformedSettings(String),
}

impl From<DigestError> for FingerprintError {
  fn from(source: DigestError) -> Self {
    FingerprintError::ReadFile {
      path: source.path().to_path_buf(),
      source,
    }
  }
}

/// Where the bytes of a file input come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
  /// A file or directory on disk.
  Disk(PathBuf),
  /// Generated content that is not on disk yet.
  Inline(Vec<u8>),
}

/// One file-like input of a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
  /// Canonical key used for ordering, normally the declared relative path.
  pub key: String,
  pub content: FileContent,
  /// Extra attributes that belong to the input (compiler flags, tags, ...).
  pub attributes: Vec<String>,
}

impl FileInput {
  pub fn disk(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Self {
      key: key.into(),
      content: FileContent::Disk(path.into()),
      attributes: Vec::new(),
    }
  }

  pub fn inline(key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self {
      key: key.into(),
      content: FileContent::Inline(content.into()),
      attributes: Vec::new(),
    }
  }

  pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = String>) -> Self {
    self.attributes.extend(attributes);
    self
  }
}

/// Computes category fingerprints.
pub trait Fingerprinter: Send + Sync {
  /// Fingerprint a set of files. `None` when `files` is empty.
  fn files(&self, files: &[FileInput]) -> Result<Option<String>, FingerprintError>;

  /// Fingerprint a list of strings. `None` when `values` is empty.
  fn strings(&self, values: &[String]) -> Option<String>;

  /// Fingerprint a settings dictionary. xcconfig paths are resolved against `base`.
  fn settings(&self, settings: &Settings, base: &Path) -> Result<String, FingerprintError> {
    let mut lines = Vec::new();

    for (key, value) in &settings.base {
      lines.push(format!("base {}", setting_line(key, value)?));
    }

    for (name, configuration) in &settings.configurations {
      if name.trim().is_empty() {
        return Err(FingerprintError::MalformedSettings(
          "configuration name is empty".to_string(),
        ));
      }
      let scope = encode(name)?;
      for (key, value) in &configuration.settings {
        lines.push(format!("configuration {} {}", scope, setting_line(key, value)?));
      }
      if let Some(xcconfig) = &configuration.xcconfig {
        lines.push(format!("xcconfig {} {}", scope, self.path(&base.join(xcconfig))?));
      }
    }

    Ok(hash::hash_lines(lines))
  }

  fn path(&self, path: &Path) -> Result<String, FingerprintError>;
}

/// SHA-256 fingerprinter over file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl ContentFingerprinter {
  pub fn new() -> Self {
    Self
  }

  fn content_hash(&self, content: &FileContent) -> Result<String, FingerprintError> {
    match content {
      FileContent::Disk(path) => Ok(hash::hash_path(path)?),
      FileContent::Inline(bytes) => Ok(hash::hash_bytes(bytes)),
    }
  }
}

impl Fingerprinter for ContentFingerprinter {
  fn files(&self, files: &[FileInput]) -> Result<Option<String>, FingerprintError> {
    if files.is_empty() {
      return Ok(None);
    }

    let mut sorted: Vec<&FileInput> = files.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.attributes.cmp(&b.attributes)));

    let mut lines = Vec::with_capacity(sorted.len());
    for file in sorted {
      let digest = self.content_hash(&file.content)?;
      let mut line = format!("{}:{}", file.key, digest);
      for attribute in &file.attributes {
        line.push(':');
        line.push_str(attribute);
      }
      lines.push(line);
    }

    Ok(Some(hash::hash_lines(lines)))
  }

  fn strings(&self, values: &[String]) -> Option<String> {
    if values.is_empty() {
      return None;
    }
    let mut sorted: Vec<&String> = values.iter().collect();
    sorted.sort();
    Some(hash::hash_lines(sorted))
  }

  fn settings(&self, settings: &Settings, base: &Path) -> Result<String, FingerprintError> {
    let mut lines = Vec::new();

    for (key, value) in &settings.base {
      lines.push(format!("base.{}", setting_line(key, value)?));
    }

    for (name, configuration) in &settings.configurations {
      if name.trim().is_empty() {
        return Err(FingerprintError::MalformedSettings(
          "configuration name is empty".to_string(),
        ));
      }
      for (key, value) in &configuration.settings {
        lines.push(format!("{}.{}", name, setting_line(key, value)?));
      }
      if let Some(xcconfig) = &configuration.xcconfig {
        lines.push(format!("{}.xcconfig={}", name, self.path(&base.join(xcconfig))?));
      }
    }

    Ok(hash::hash_lines(lines))
  }

  fn path(&self, path: &Path) -> Result<String, FingerprintError> {
    Ok(hash::hash_path(path)?)
  }
}

/// JSON keeps keys and values apart however they are spelled, so
/// `["-DA,-DB"]` and `["-DA", "-DB"]` stay distinct.
fn setting_line(key: &str, value: &SettingValue) -> Result<String, FingerprintError> {
  if key.trim().is_empty() {
    return Err(FingerprintError::MalformedSettings("setting key is empty".to_string()));
  }
  Ok(format!("{} {}", encode(key)?, encode(value)?))
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, FingerprintError> {
  serde_json::to_string(value).map_err(|e| FingerprintError::MalformedSettings(e.to_string()))
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::fs;

  use proptest::prelude::*;
  use tempfile::tempdir;

  use super::*;
  use crate::graph::Configuration;

  #[test]
  fn empty_inputs_have_no_fingerprint() {
    let fp = ContentFingerprinter::new();
    assert_eq!(fp.files(&[]).unwrap(), None);
    assert_eq!(fp.strings(&[]), None);
  }

  #[test]
  fn file_order_does_not_matter() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.swift"), "let a = 1").unwrap();
    fs::write(temp.path().join("b.swift"), "let b = 2").unwrap();

    let a = FileInput::disk("a.swift", temp.path().join("a.swift"));
    let b = FileInput::disk("b.swift", temp.path().join("b.swift"));

    let fp = ContentFingerprinter::new();
    assert_eq!(
      fp.files(&[a.clone(), b.clone()]).unwrap(),
      fp.files(&[b, a]).unwrap()
    );
  }

  #[test]
  fn content_not_metadata_is_hashed() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("a.swift");
    fs::write(&file, "let a = 1").unwrap();

    let fp = ContentFingerprinter::new();
    let input = [FileInput::disk("a.swift", &file)];
    let before = fp.files(&input).unwrap();

    fs::write(&file, "let a = 1").unwrap();
    assert_eq!(before, fp.files(&input).unwrap());

    fs::write(&file, "let a = 2").unwrap();
    assert_ne!(before, fp.files(&input).unwrap());
  }

  #[test]
  fn inline_content_matches_disk_content() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("Gen.swift");
    fs::write(&file, "generated").unwrap();

    let fp = ContentFingerprinter::new();
    assert_eq!(
      fp.files(&[FileInput::disk("Gen.swift", &file)]).unwrap(),
      fp.files(&[FileInput::inline("Gen.swift", "generated")]).unwrap()
    );
  }

  #[test]
  fn attributes_contribute() {
    let fp = ContentFingerprinter::new();
    let plain = FileInput::inline("a.swift", "x");
    let flagged = FileInput::inline("a.swift", "x").with_attributes(["-O".to_string()]);
    assert_ne!(fp.files(&[plain]).unwrap(), fp.files(&[flagged]).unwrap());
  }

  #[test]
  fn unreadable_file_is_fatal() {
    let fp = ContentFingerprinter::new();
    let err = fp
      .files(&[FileInput::disk("gone.swift", "/no/such/dir/gone.swift")])
      .unwrap_err();
    match err {
      FingerprintError::ReadFile { path, .. } => assert_eq!(path, PathBuf::from("/no/such/dir/gone.swift")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn strings_are_order_independent() {
    let fp = ContentFingerprinter::new();
    let a = vec!["x".to_string(), "y".to_string()];
    let b = vec!["y".to_string(), "x".to_string()];
    assert_eq!(fp.strings(&a), fp.strings(&b));
  }

  #[test]
  fn settings_fingerprint_tracks_values_and_xcconfig() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("Debug.xcconfig"), "A = 1").unwrap();

    let mut settings = Settings {
      base: BTreeMap::from([("SWIFT_VERSION".to_string(), SettingValue::String("5.9".to_string()))]),
      configurations: BTreeMap::from([(
        "Debug".to_string(),
        Configuration {
          settings: BTreeMap::new(),
          xcconfig: Some(PathBuf::from("Debug.xcconfig")),
        },
      )]),
    };

    let fp = ContentFingerprinter::new();
    let first = fp.settings(&settings, temp.path()).unwrap();

    fs::write(temp.path().join("Debug.xcconfig"), "A = 2").unwrap();
    let second = fp.settings(&settings, temp.path()).unwrap();
    assert_ne!(first, second);

    settings
      .base
      .insert("SWIFT_VERSION".to_string(), SettingValue::String("6.0".to_string()));
    assert_ne!(second, fp.settings(&settings, temp.path()).unwrap());
  }

  #[test]
  fn array_items_are_not_joined() {
    let with = |key: &str, value: SettingValue| Settings {
      base: BTreeMap::from([(key.to_string(), value)]),
      configurations: BTreeMap::new(),
    };
    let fp = ContentFingerprinter::new();
    let fingerprint = |settings: Settings| fp.settings(&settings, Path::new("/")).unwrap();

    let joined = with("OTHER_SWIFT_FLAGS", SettingValue::Array(vec!["-DA,-DB".to_string()]));
    let split = with(
      "OTHER_SWIFT_FLAGS",
      SettingValue::Array(vec!["-DA".to_string(), "-DB".to_string()]),
    );
    assert_ne!(fingerprint(joined), fingerprint(split));

    let key_with_equals = with("A=B", SettingValue::String("C".to_string()));
    let value_with_equals = with("A", SettingValue::String("B=C".to_string()));
    assert_ne!(fingerprint(key_with_equals), fingerprint(value_with_equals));
  }

  #[test]
  fn configuration_named_base_is_not_base_settings() {
    let value = || BTreeMap::from([("SWIFT_VERSION".to_string(), SettingValue::String("6.0".to_string()))]);
    let in_base = Settings {
      base: value(),
      configurations: BTreeMap::new(),
    };
    let in_configuration = Settings {
      base: BTreeMap::new(),
      configurations: BTreeMap::from([(
        "base".to_string(),
        Configuration {
          settings: value(),
          xcconfig: None,
        },
      )]),
    };
    let fp = ContentFingerprinter::new();
    assert_ne!(
      fp.settings(&in_base, Path::new("/")).unwrap(),
      fp.settings(&in_configuration, Path::new("/")).unwrap()
    );
  }

  #[test]
  fn empty_setting_key_is_malformed() {
    let settings = Settings {
      base: BTreeMap::from([(" ".to_string(), SettingValue::String("x".to_string()))]),
      configurations: BTreeMap::new(),
    };
    let err = ContentFingerprinter::new()
      .settings(&settings, Path::new("/"))
      .unwrap_err();
    assert!(matches!(err, FingerprintError::MalformedSettings(_)));
  }

  #[test]
  fn empty_configuration_name_is_malformed() {
    let settings = Settings {
      base: BTreeMap::new(),
      configurations: BTreeMap::from([(String::new(), Configuration::default())]),
    };
    assert!(matches!(
      ContentFingerprinter::new().settings(&settings, Path::new("/")),
      Err(FingerprintError::MalformedSettings(_))
    ));
  }

  proptest! {
    #[test]
    fn any_permutation_gives_the_same_fingerprint(
      contents in proptest::collection::btree_map("[a-z]{1,8}\\.swift", ".{0,32}", 1..8),
      seed in any::<u64>(),
    ) {
      let inputs: Vec<FileInput> = contents
        .iter()
        .map(|(key, body)| FileInput::inline(key.clone(), body.clone()))
        .collect();
      let mut shuffled = inputs.clone();
      let len = shuffled.len();
      shuffled.rotate_left((seed as usize) % len);
      shuffled.reverse();

      let fp = ContentFingerprinter::new();
      prop_assert_eq!(fp.files(&inputs).unwrap(), fp.files(&shuffled).unwrap());
    }
  }
}
