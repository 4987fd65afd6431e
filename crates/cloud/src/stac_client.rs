//! Async STAC client: item search with pagination, and asset href signing.
//!
//! Planetary Computer and Earth Search are known out of the box; any other
//! STAC API can be used through [`StacCatalog::Custom`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::{self, CloudAuth, NoAuth, SasToken};
use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_STAC_SEARCH: &str = "https://planetarycomputer.microsoft.com/api/stac/v1/search";
const PC_SAS_TOKEN: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";
const ES_STAC_SEARCH: &str = "https://earth-search.aws.element84.com/v1/search";
const MAX_BACKOFF_EXPONENT: u32 = 7;

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer; asset hrefs need a SAS token.
    PlanetaryComputer,
    /// Element 84 Earth Search on AWS.
    EarthSearch,
    /// Any STAC API root or `/search` URL.
    Custom(String),
}

impl StacCatalog {
    /// URL of the item search endpoint.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => PC_STAC_SEARCH.to_string(),
            Self::EarthSearch => ES_STAC_SEARCH.to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{base}/search")
                }
            }
        }
    }

    /// `pc`, `planetary-computer`, `es` and `earth-search` select the known
    /// catalogs; anything else is a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.trim().to_string()),
        }
    }

    /// Whether asset hrefs must be signed before they can be read.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }

    /// SAS token endpoint for a collection, for catalogs that sign hrefs.
    pub fn sas_token_url(&self, collection: &str) -> Option<String> {
        self.needs_signing()
            .then(|| format!("{PC_SAS_TOKEN}/{collection}"))
    }
}

impl fmt::Display for StacCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanetaryComputer => f.write_str("Planetary Computer"),
            Self::EarthSearch => f.write_str("Earth Search"),
            Self::Custom(url) => f.write_str(url),
        }
    }
}

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Retries on transient failures (default 3).
    pub max_retries: u32,
    /// Cap on items collected across pages (default 500).
    pub max_items: usize,
    /// Items requested per page (default 100).
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 500,
            page_size: 100,
        }
    }
}

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
    auth: Arc<dyn CloudAuth>,
    tokens: Mutex<HashMap<String, SasToken>>,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
            auth: Arc::new(NoAuth),
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Credentials sent with search, token and asset requests.
    pub fn with_auth(mut self, auth: Arc<dyn CloudAuth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    pub fn auth(&self) -> Arc<dyn CloudAuth> {
        Arc::clone(&self.auth)
    }

    /// One page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.post_search(&self.catalog.search_url(), params).await
    }

    /// All pages, following `next` links until exhausted or `max_items`.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let max = self.options.max_items;
        let mut params = params.clone();
        if params.limit.is_none() {
            params.limit = Some(self.options.page_size);
        }

        let mut items = Vec::new();
        let mut page = self.search(&params).await?;
        loop {
            let next = page.next_link().cloned();
            items.append(&mut page.features);

            if items.len() >= max {
                debug!("item cap of {max} reached, not following further pages");
                break;
            }
            let Some(link) = next else { break };

            page = self.follow_next(&link, &params).await?;
            if page.is_empty() {
                break;
            }
        }

        items.truncate(max);
        Ok(items)
    }

    /// Make an asset href readable.
    ///
    /// Planetary Computer hrefs get the collection's SAS token appended;
    /// the token is cached until shortly before it expires. Other catalogs
    /// return the href unchanged.
    pub async fn sign_asset_href(&self, href: &str, collection: &str) -> Result<String> {
        Ok(match self.sas_token(collection).await? {
            Some(token) => token.sign_href(href),
            None => href.to_string(),
        })
    }

    /// SAS token for `collection`, from the cache or the token endpoint.
    ///
    /// `None` for catalogs that do not sign hrefs.
    pub async fn sas_token(&self, collection: &str) -> Result<Option<SasToken>> {
        let Some(url) = self.catalog.sas_token_url(collection) else {
            return Ok(None);
        };

        if let Some(token) = self.cached_token(collection) {
            return Ok(Some(token));
        }

        debug!("requesting SAS token for {collection}");
        let req = auth::apply(self.auth.as_ref(), &url, "GET", self.client.get(&url))?;
        let resp = req
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("SAS token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "SAS token endpoint returned HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CloudError::Auth(format!("reading SAS token response: {e}")))?;
        let token = parse_sas_token(&body)?;

        self.lock_tokens().insert(collection.to_string(), token.clone());
        Ok(Some(token))
    }

    fn cached_token(&self, collection: &str) -> Option<SasToken> {
        let now = Utc::now();
        self.lock_tokens()
            .get(collection)
            .filter(|t| t.is_valid_at(now))
            .cloned()
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, SasToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.with_retry("STAC search", "POST", url, || {
            self.client
                .post(url)
                .header("Content-Type", "application/json")
                .json(params)
        })
        .await
    }

    async fn follow_next(&self, link: &StacLink, params: &StacSearchParams) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();
        if method == "POST" {
            let body = next_page_body(link, params)?;
            self.post_search(&link.href, &body).await
        } else {
            self.with_retry("STAC pagination", "GET", &link.href, || self.client.get(&link.href))
                .await
        }
    }

    /// Send a request built by `build`, retrying with exponential backoff
    /// (500 ms, 1 s, 2 s, ... up to 64 s). Client errors (4xx) are not retried.
    async fn with_retry<T, F>(&self, what: &str, method: &str, url: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!("{what} failed, retry {attempt}/{} in {delay:?}", self.options.max_retries);
                tokio::time::sleep(delay).await;
            }

            let req = auth::apply(self.auth.as_ref(), url, method, build())?;
            match req.send().await {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading {what} response: {e}")))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| CloudError::Stac(format!("parsing {what} response: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    last_err = Some(CloudError::Network(format!(
                        "{what} returned HTTP {status}: {}",
                        truncate(&body, 500)
                    )));
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_err = Some(CloudError::Network(format!("{what} request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network(format!("{what} failed"))))
    }
}

/// Delay before retry `attempt` (1-based): 500 ms doubling, capped at 64 s.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_millis(500).saturating_mul(1 << exponent)
}

fn parse_sas_token(body: &str) -> Result<SasToken> {
    serde_json::from_str(body)
        .map_err(|e| CloudError::Auth(format!("invalid SAS token response: {e}")))
}

/// Body of the POST request for a `next` link.
///
/// With `merge`, the link body overlays the previous request; otherwise the
/// link body replaces it (falling back to the previous request if absent).
fn next_page_body(link: &StacLink, params: &StacSearchParams) -> Result<StacSearchParams> {
    let to_json = |p: &StacSearchParams| {
        serde_json::to_value(p).map_err(|e| CloudError::Stac(format!("serializing search: {e}")))
    };

    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(extra), true) => {
            let mut base = to_json(params)?;
            if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
                base.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            base
        }
        (Some(body), false) => body.clone(),
        (None, _) => to_json(params)?,
    };

    serde_json::from_value(body).map_err(|e| CloudError::Stac(format!("invalid next-page body: {e}")))
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
