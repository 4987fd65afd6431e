//! Anonymous access.

use crate::auth::CloudAuth;
use crate::error::Result;

/// No credentials: public catalogs and already-signed asset URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl CloudAuth for NoAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        _headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        Ok(())
    }
}
