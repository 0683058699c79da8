//! Ed25519 authentication of artifact responses.
//!
//! The service signs the content hash of every artifact it hands out and
//! sends the base64 signature in the `x-cache-signature` header. Only
//! responses of the artifact endpoint that name a `hash` are checked.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use reqwest::Url;
use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::consts::SIGNATURE_HEADER;

const ARTIFACT_PATH: &str = "/api/cache";

#[derive(Debug, Error)]
pub enum SignatureError {
  #[error("invalid verifying key: {0}")]
  InvalidKey(String),

  #[error("response is missing the x-cache-signature header")]
  MissingSignature,

  #[error("response signature does not match")]
  InvalidSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
  Verified,
  /// The response is not an artifact response; nothing to check.
  NotApplicable,
}

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
  key: VerifyingKey,
}

impl SignatureVerifier {
  pub fn new(key: VerifyingKey) -> Self {
    Self { key }
  }

  /// Parse a base64-encoded 32-byte public key.
  pub fn from_base64(encoded: &str) -> Result<Self, SignatureError> {
    let bytes = STANDARD
      .decode(encoded.trim())
      .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
      .try_into()
      .map_err(|b: Vec<u8>| SignatureError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
    let key = VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    Ok(Self { key })
  }

  /// Verify the response to a request for `url`.
  pub fn verify(&self, url: &Url, headers: &HeaderMap) -> Result<Verification, SignatureError> {
    // The base URL may carry a path prefix.
    if !url.path().ends_with(ARTIFACT_PATH) {
      return Ok(Verification::NotApplicable);
    }
    let Some(hash) = url.query_pairs().find(|(k, _)| k == "hash").map(|(_, v)| v.into_owned()) else {
      return Ok(Verification::NotApplicable);
    };

    let header = headers.get(SIGNATURE_HEADER).ok_or(SignatureError::MissingSignature)?;
    let raw = STANDARD
      .decode(header.as_bytes())
      .map_err(|_| SignatureError::InvalidSignature)?;
    let signature = Signature::from_slice(&raw).map_err(|_| SignatureError::InvalidSignature)?;

    self
      .key
      .verify(hash.as_bytes(), &signature)
      .map_err(|_| SignatureError::InvalidSignature)?;
    Ok(Verification::Verified)
  }
}
