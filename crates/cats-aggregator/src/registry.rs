//! Where the aggregator gets its poll targets.

use std::future::Future;

use cats_core::Site;

use crate::error::RegistryError;

/// Supplies the list of sites to poll, once per cycle.
pub trait SiteRegistry: Send + Sync + 'static {
    fn sites(&self) -> impl Future<Output = Result<Vec<Site>, RegistryError>> + Send;
}

/// A fixed site list, typically the `[[sites]]` table of `cats.toml`.
#[derive(Debug, Clone, Default)]
pub struct StaticSiteRegistry {
    sites: Vec<Site>,
}

impl StaticSiteRegistry {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }
}

impl SiteRegistry for StaticSiteRegistry {
    async fn sites(&self) -> Result<Vec<Site>, RegistryError> {
        Ok(self.sites.clone())
    }
}
