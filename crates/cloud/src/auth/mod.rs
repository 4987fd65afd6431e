//! Request signing for catalog and asset access.

mod none;
pub mod planetary;

pub use none::NoAuth;
pub use planetary::{SasToken, SubscriptionKey};

use crate::error::Result;

/// Adds credentials to outgoing HTTP requests.
///
/// Implementations push extra headers (subscription keys, session tokens)
/// before a request is sent. URL-embedded credentials such as Planetary
/// Computer SAS tokens are handled by [`SasToken::sign_href`] instead,
/// because they must be applied before the reader is opened.
pub trait CloudAuth: Send + Sync {
    /// Add authentication headers for a request to `url` with `method`.
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}

/// Apply `auth` to a reqwest builder.
pub(crate) fn apply(
    auth: &dyn CloudAuth,
    url: &str,
    method: &str,
    mut req: reqwest::RequestBuilder,
) -> Result<reqwest::RequestBuilder> {
    let mut headers = Vec::new();
    auth.sign_request(url, method, &mut headers)?;
    for (key, value) in &headers {
        req = req.header(key.as_str(), value.as_str());
    }
    Ok(req)
}
