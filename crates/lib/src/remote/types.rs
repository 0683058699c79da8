use serde::{Deserialize, Serialize};

use crate::cache::CacheCategory;

/// Addresses one artifact on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub name: String,
  pub hash: String,
  pub category: CacheCategory,
}

impl CacheKey {
  pub fn new(name: impl Into<String>, hash: impl Into<String>, category: CacheCategory) -> Self {
    Self {
      name: name.into(),
      hash: hash.into(),
      category,
    }
  }
}

/// `GET /api/cache`
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadUrl {
  pub url: String,
  #[serde(default)]
  pub expires_at: Option<i64>,
}

/// `POST /api/cache/upload` and `POST /api/cache/multipart/generate-url`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadUrl {
  pub url: String,
}

/// `POST /api/cache/multipart/start`
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartStart {
  pub upload_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
  pub part_number: u32,
  pub etag: String,
}

/// Body of `POST /api/cache/multipart/complete`
#[derive(Debug, Clone, Serialize)]
pub struct CompleteMultipart {
  pub parts: Vec<CompletedPart>,
}

/// `GET /api/cache/size`
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSize {
  pub size: u64,
}
