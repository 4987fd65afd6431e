//! Microsoft Planetary Computer credentials.
//!
//! Two mechanisms are involved:
//! - an optional API subscription key, sent as the
//!   `Ocp-Apim-Subscription-Key` header (raises rate limits), read from
//!   `PC_SDK_SUBSCRIPTION_KEY`;
//! - short-lived SAS tokens, one per collection, appended to blob URLs.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::auth::CloudAuth;
use crate::error::Result;

/// Environment variable holding the Planetary Computer subscription key.
pub const SUBSCRIPTION_KEY_ENV: &str = "PC_SDK_SUBSCRIPTION_KEY";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Planetary Computer API subscription key.
#[derive(Clone)]
pub struct SubscriptionKey {
    key: String,
}

impl SubscriptionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Read the key from [`SUBSCRIPTION_KEY_ENV`], if set and non-empty.
    pub fn from_env() -> Option<Self> {
        std::env::var(SUBSCRIPTION_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }
}

impl std::fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SubscriptionKey(***)")
    }
}

impl CloudAuth for SubscriptionKey {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        headers.push((SUBSCRIPTION_KEY_HEADER.to_string(), self.key.clone()));
        Ok(())
    }
}

/// A SAS token for one Planetary Computer collection.
#[derive(Debug, Clone, Deserialize)]
pub struct SasToken {
    pub token: String,
    #[serde(rename = "msft:expiry")]
    pub expiry: DateTime<Utc>,
}

impl SasToken {
    /// Tokens are refreshed this long before they expire.
    pub const EXPIRY_MARGIN_SECS: i64 = 60;

    /// Whether the token can still be used at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(Self::EXPIRY_MARGIN_SECS) < self.expiry
    }

    /// Append the token to an asset href.
    ///
    /// Hrefs that already carry a query string get the token joined with `&`.
    pub fn sign_href(&self, href: &str) -> String {
        let token = self.token.trim_start_matches('?');
        if href.contains('?') {
            format!("{href}&{token}")
        } else {
            format!("{href}?{token}")
        }
    }
}
