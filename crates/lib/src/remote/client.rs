//! HTTP client for the remote cache service.

use std::path::Path;
use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::multipart;
use super::signature::SignatureVerifier;
use super::types::{CacheKey, DownloadUrl, UploadUrl};
use super::{RemoteCache, RemoteError};
use crate::config::{MultipartConfig, RemoteConfig};

struct Inner {
  http: Client,
  base_url: Url,
  project_id: String,
  token: Option<String>,
  verifier: Option<SignatureVerifier>,
  multipart: MultipartConfig,
}

/// Client for the cache service. Cheap to clone; clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct HttpCacheClient {
  inner: Arc<Inner>,
}

impl HttpCacheClient {
  /// Create a client. `http` is shared so callers control pooling and timeouts.
  pub fn new(http: Client, config: &RemoteConfig) -> Result<Self, RemoteError> {
    let base_url = Url::parse(&config.url).map_err(|_| RemoteError::InvalidUrl(config.url.clone()))?;
    let verifier = config
      .verifying_key
      .as_deref()
      .map(SignatureVerifier::from_base64)
      .transpose()?;

    Ok(Self {
      inner: Arc::new(Inner {
        http,
        base_url,
        project_id: config.project_id.clone(),
        token: config.token.clone(),
        verifier,
        multipart: config.multipart.clone(),
      }),
    })
  }

  /// Build a `reqwest::Client` configured for `config`.
  pub fn http_client(config: &RemoteConfig) -> Result<Client, RemoteError> {
    Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!("stowage/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|source| RemoteError::Network {
        url: config.url.clone(),
        source,
      })
  }

  pub(crate) fn multipart_config(&self) -> &MultipartConfig {
    &self.inner.multipart
  }

  /// URL of an API endpoint with the key's query parameters and `extra`.
  pub(crate) fn api_url(&self, path: &str, key: &CacheKey, extra: &[(&str, String)]) -> Result<Url, RemoteError> {
    let base = self.inner.base_url.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!("{}{}", base, path)).map_err(|_| RemoteError::InvalidUrl(path.to_string()))?;
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("project_id", &self.inner.project_id);
      query.append_pair("hash", &key.hash);
      query.append_pair("name", &key.name);
      query.append_pair("cache_category", key.category.as_str());
      for (name, value) in extra {
        query.append_pair(name, value);
      }
    }
    Ok(url)
  }

  /// A request to the API, carrying the bearer token when configured.
  pub(crate) fn api_request(&self, method: Method, url: Url) -> RequestBuilder {
    let request = self.inner.http.request(method, url);
    match &self.inner.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  /// A request to a presigned storage URL. These never carry credentials.
  pub(crate) fn storage_request(&self, method: Method, url: &str) -> Result<RequestBuilder, RemoteError> {
    let url = Url::parse(url).map_err(|_| RemoteError::InvalidUrl(url.to_string()))?;
    Ok(self.inner.http.request(method, url))
  }

  pub(crate) async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, RemoteError> {
    request.send().await.map_err(|source| RemoteError::Network {
      url: url.to_string(),
      source,
    })
  }

  pub(crate) async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, RemoteError> {
    let url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Http {
        url,
        status: status.as_u16(),
      });
    }
    response.json::<T>().await.map_err(|e| RemoteError::InvalidResponse {
      url,
      message: e.to_string(),
    })
  }

  /// Ask the service for a presigned download URL, verifying the response signature.
  async fn download_url(&self, key: &CacheKey) -> Result<DownloadUrl, RemoteError> {
    let url = self.api_url("/api/cache", key, &[])?;
    let response = self.send(self.api_request(Method::GET, url.clone()), url.as_str()).await?;

    if response.status() == StatusCode::NOT_FOUND {
      return Err(RemoteError::NotFound { hash: key.hash.clone() });
    }
    if response.status().is_success()
      && let Some(verifier) = &self.inner.verifier
    {
      verifier.verify(&url, response.headers())?;
    }

    self.json(response).await
  }

  async fn single_upload(&self, key: &CacheKey, source: &Path, size: u64) -> Result<(), RemoteError> {
    let url = self.api_url("/api/cache/upload", key, &[("content_length", size.to_string())])?;
    let response = self.send(self.api_request(Method::POST, url.clone()), url.as_str()).await?;
    let upload: UploadUrl = self.json(response).await?;

    let body = tokio::fs::read(source).await.map_err(|e| RemoteError::Io {
      path: source.to_path_buf(),
      source: e,
    })?;
    let request = self
      .storage_request(Method::PUT, &upload.url)?
      .header(reqwest::header::CONTENT_LENGTH, size)
      .body(body);
    let response = self.send(request, &upload.url).await?;
    if !response.status().is_success() {
      return Err(RemoteError::Http {
        url: upload.url,
        status: response.status().as_u16(),
      });
    }
    Ok(())
  }
}

impl RemoteCache for HttpCacheClient {
  async fn exists(&self, key: &CacheKey) -> Result<bool, RemoteError> {
    let url = self.api_url("/api/cache", key, &[])?;
    let response = self.send(self.api_request(Method::HEAD, url.clone()), url.as_str()).await?;

    match response.status() {
      status if status.is_success() => Ok(true),
      StatusCode::NOT_FOUND => Ok(false),
      status => Err(RemoteError::Http {
        url: url.to_string(),
        status: status.as_u16(),
      }),
    }
  }

  async fn fetch(&self, key: &CacheKey, destination: &Path) -> Result<u64, RemoteError> {
    let mut refreshed = false;

    loop {
      let download = self.download_url(key).await?;
      let response = self
        .send(self.storage_request(Method::GET, &download.url)?, &download.url)
        .await?;

      let status = response.status();
      if (status == StatusCode::FORBIDDEN || status == StatusCode::GONE) && !refreshed {
        warn!(hash = %key.hash, status = status.as_u16(), "download URL expired, requesting a fresh one");
        refreshed = true;
        continue;
      }
      if !status.is_success() {
        return Err(RemoteError::Http {
          url: download.url,
          status: status.as_u16(),
        });
      }

      let written = stream_to_file(response, destination, &download.url).await?;
      debug!(hash = %key.hash, bytes = written, "downloaded artifact");
      return Ok(written);
    }
  }

  async fn store(&self, key: &CacheKey, source: &Path) -> Result<(), RemoteError> {
    let size = tokio::fs::metadata(source)
      .await
      .map_err(|e| RemoteError::Io {
        path: source.to_path_buf(),
        source: e,
      })?
      .len();

    if size >= self.inner.multipart.threshold {
      multipart::upload(self, key, source, size).await?;
    } else {
      self.single_upload(key, source, size).await?;
    }

    info!(name = %key.name, hash = %key.hash, bytes = size, "uploaded artifact");
    Ok(())
  }
}

async fn stream_to_file(mut response: Response, destination: &Path, url: &str) -> Result<u64, RemoteError> {
  let io_err = |e| RemoteError::Io {
    path: destination.to_path_buf(),
    source: e,
  };

  let mut file = tokio::fs::File::create(destination).await.map_err(io_err)?;
  let mut written: u64 = 0;

  while let Some(chunk) = response.chunk().await.map_err(|source| RemoteError::Network {
    url: url.to_string(),
    source,
  })? {
    file.write_all(&chunk).await.map_err(io_err)?;
    written += chunk.len() as u64;
  }

  file.flush().await.map_err(io_err)?;
  file.sync_all().await.map_err(io_err)?;
  Ok(written)
}
