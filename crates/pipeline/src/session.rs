//! Remote imagery session: STAC client, credentials and read options.

use std::sync::Arc;

use ndvits_cloud::{
    CogReaderOptions, StacCatalog, StacClient, StacClientOptions, SubscriptionKey,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::product::LANDSAT_COLLECTION;

/// Options for [`ImagerySession::connect`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Planetary Computer subscription key; `None` for anonymous access.
    pub subscription_key: Option<SubscriptionKey>,
    pub stac: StacClientOptions,
    pub cog: CogReaderOptions,
}

impl SessionOptions {
    /// Defaults, with the subscription key taken from `PC_SDK_SUBSCRIPTION_KEY`.
    pub fn from_env() -> Self {
        Self {
            subscription_key: SubscriptionKey::from_env(),
            ..Self::default()
        }
    }
}

/// An authenticated connection to a STAC catalog.
pub struct ImagerySession {
    client: StacClient,
    cog: CogReaderOptions,
}

impl ImagerySession {
    /// Build the client for `catalog` and check credentials.
    ///
    /// For catalogs that sign asset hrefs, a SAS token for the Landsat
    /// collection is requested up front, so a refused token surfaces here
    /// as [`CloudError::Auth`](ndvits_cloud::CloudError::Auth) rather than
    /// on the first pixel read.
    pub async fn connect(catalog: StacCatalog, options: SessionOptions) -> Result<Self> {
        let mut client = StacClient::new(catalog, options.stac)?;
        match options.subscription_key {
            Some(key) => {
                debug!("using Planetary Computer subscription key");
                client = client.with_auth(Arc::new(key));
            }
            None => debug!("no subscription key, anonymous access"),
        }

        if let Some(token) = client.sas_token(LANDSAT_COLLECTION).await? {
            debug!("SAS token for {LANDSAT_COLLECTION} valid until {}", token.expiry);
        }
        info!("Connected to {}", client.catalog());

        Ok(Self {
            client,
            cog: options.cog,
        })
    }

    pub fn client(&self) -> &StacClient {
        &self.client
    }

    pub fn catalog(&self) -> &StacCatalog {
        self.client.catalog()
    }

    pub fn cog_options(&self) -> &CogReaderOptions {
        &self.cog
    }
}
