use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};

/// Minimal key/value blob API the object backend is written against.
///
/// There is deliberately no listing primitive; the backend keeps its own index.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// `Ok(false)` when the key did not exist.
    async fn delete(&self, key: &str) -> Result<bool>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Blob client for an HTTP object store addressed as `{base_url}/{key}`.
pub struct HttpBlobClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building object store HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl BlobClient for HttpBlobClient {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let resp = self
            .authorize(self.client.get(self.url(key)))
            .send()
            .await
            .with_context(|| format!("GET {}", key))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.bytes().await?)),
            s => bail!("GET {} failed: {}", key, s),
        }
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let resp = self
            .authorize(self.client.put(self.url(key)))
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("PUT {}", key))?;

        if !resp.status().is_success() {
            bail!("PUT {} failed: {}", key, resp.status());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let resp = self
            .authorize(self.client.delete(self.url(key)))
            .send()
            .await
            .with_context(|| format!("DELETE {}", key))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => bail!("DELETE {} failed: {}", key, s),
        }
    }
}

/// In-process blob client. Used by tests and the `object` demo mode without
/// a configured URL.
#[derive(Default)]
pub struct MemoryBlobClient {
    blobs: Mutex<BTreeMap<String, Bytes>>,
    failing_prefixes: Mutex<Vec<String>>,
}

impl MemoryBlobClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write under `prefix` fail from now on.
    pub fn fail_writes_under(&self, prefix: &str) {
        lock(&self.failing_prefixes).push(prefix.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.blobs).contains_key(key)
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if lock(&self.failing_prefixes)
            .iter()
            .any(|p| key.starts_with(p.as_str()))
        {
            bail!("write to {} rejected", key);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BlobClient for MemoryBlobClient {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(lock(&self.blobs).get(key).cloned())
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        self.check_writable(key)?;
        lock(&self.blobs).insert(key.to_string(), body);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_writable(key)?;
        Ok(lock(&self.blobs).remove(key).is_some())
    }
}
