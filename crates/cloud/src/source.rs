//! Byte-range sources for the COG reader.
//!
//! [`HttpSource`] fetches ranges from a remote file with retry and auth;
//! [`MemorySource`] serves ranges from an in-memory buffer (local files,
//! tests). The reader is generic over [`RangeSource`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::auth::{self, CloudAuth, NoAuth};
use crate::error::{CloudError, Result};

/// Random-access byte source.
pub trait RangeSource {
    /// Human-readable location, used in logs and errors.
    fn location(&self) -> &str;

    /// Total size in bytes, if the source can tell.
    fn size(&self) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Bytes `[offset, offset + length)`.
    fn fetch(&self, offset: u64, length: u64) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Fetch several ranges concurrently, results in request order.
    fn fetch_many(
        &self,
        ranges: &[(u64, u64)],
    ) -> impl Future<Output = Result<Vec<Vec<u8>>>> + Send {
        let mut futs = FuturesOrdered::new();
        for &(offset, length) in ranges {
            futs.push_back(self.fetch(offset, length));
        }
        async move {
            let mut out = Vec::with_capacity(ranges.len());
            while let Some(res) = futs.next().await {
                out.push(res?);
            }
            Ok(out)
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Remote file read through HTTP Range requests.
pub struct HttpSource {
    url: String,
    client: Client,
    auth: Arc<dyn CloudAuth>,
    max_retries: u32,
}

impl HttpSource {
    /// Create a source for `url`.
    pub fn new(url: impl Into<String>, request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            auth: Arc::new(NoAuth),
            max_retries,
        })
    }

    /// Attach credentials sent with every request.
    pub fn with_auth(mut self, auth: Arc<dyn CloudAuth>) -> Self {
        self.auth = auth;
        self
    }

    /// Send a request, retrying timeouts and connection failures with
    /// exponential backoff (100 ms, 200 ms, 400 ms, ...).
    async fn send_with_retry(&self, method: &str, range: Option<String>) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let req = match method {
                "HEAD" => self.client.head(&self.url),
                _ => self.client.get(&self.url),
            };
            let req = match &range {
                Some(r) => req.header("Range", r.as_str()),
                None => req,
            };
            let req = auth::apply(self.auth.as_ref(), &self.url, method, req)?;

            match req.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(100).saturating_mul(1 << attempt.min(9));
                    debug!("{} {} failed ({e}), retrying in {:?}", method, self.url, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl RangeSource for HttpSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn size(&self) -> Result<Option<u64>> {
        let resp = self.send_with_retry("HEAD", None).await?;
        if !resp.status().is_success() {
            return Err(CloudError::Network(format!(
                "HTTP {} on HEAD {}",
                resp.status(),
                self.url
            )));
        }
        Ok(resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok()))
    }

    async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let resp = self.send_with_retry("GET", Some(range)).await?;

        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(CloudError::RangeNotSupported {
                url: self.url.clone(),
            });
        }
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(CloudError::Network(format!(
                "HTTP {} fetching {}",
                status, self.url
            )));
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Byte buffer served as a range source.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    bytes: Arc<Vec<u8>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }
}

impl RangeSource for MemorySource {
    fn location(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> Result<Option<u64>> {
        Ok(Some(self.bytes.len() as u64))
    }

    async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start.saturating_add(length as usize).min(self.bytes.len());
        if start > end {
            return Err(CloudError::InvalidTiff {
                reason: format!("range {offset}+{length} beyond end of {}", self.name),
            });
        }
        Ok(self.bytes[start..end].to_vec())
    }
}
