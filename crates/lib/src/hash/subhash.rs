use serde::{Deserialize, Serialize};

/// Per-category fingerprints of one target.
///
/// Fields are declared in the order they are folded into the content hash.
/// `None` means the category has no inputs and is left out entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subhashes {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sources: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resources: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub copy_files: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub core_data_models: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_scripts: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dependencies: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub headers: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deployment_target: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub info_plist: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub entitlements: Option<String>,
  pub project_settings: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_settings: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub buildable_folders: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub additional_strings: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external: Option<String>,
}

impl Subhashes {
  /// Present fingerprints as `(label, value)` in fold order, up to and
  /// including `buildable_folders`. The content hasher appends additional
  /// strings and then `external` itself.
  pub fn labelled(&self) -> Vec<(&'static str, &str)> {
    let optional = [
      ("sources", &self.sources),
      ("resources", &self.resources),
      ("copy_files", &self.copy_files),
      ("core_data_models", &self.core_data_models),
      ("target_scripts", &self.target_scripts),
      ("dependencies", &self.dependencies),
      ("environment", &self.environment),
      ("headers", &self.headers),
      ("deployment_target", &self.deployment_target),
      ("info_plist", &self.info_plist),
      ("entitlements", &self.entitlements),
    ];

    let mut out: Vec<(&'static str, &str)> = optional
      .iter()
      .filter_map(|(label, value)| value.as_deref().map(|v| (*label, v)))
      .collect();

    out.push(("project_settings", &self.project_settings));

    for (label, value) in [
      ("target_settings", &self.target_settings),
      ("buildable_folders", &self.buildable_folders),
    ] {
      if let Some(v) = value {
        out.push((label, v));
      }
    }

    out
  }
}
