//! Confirms that a requested service id is registered.

use std::collections::HashSet;
use std::future::Future;

use thiserror::Error;

/// The catalog could not be consulted.
#[derive(Debug, Error)]
#[error("service catalog unavailable: {0}")]
pub struct CatalogError(pub String);

pub trait ServiceCatalog: Send + Sync + 'static {
    fn is_registered(&self, service_id: &str) -> impl Future<Output = Result<bool, CatalogError>> + Send;
}

/// A fixed set of service ids. An empty set accepts every id.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    services: HashSet<String>,
}

impl StaticCatalog {
    pub fn new(services: impl IntoIterator<Item = String>) -> Self {
        Self {
            services: services.into_iter().collect(),
        }
    }

    /// Accept every service id.
    pub fn open() -> Self {
        Self::default()
    }
}

impl ServiceCatalog for StaticCatalog {
    async fn is_registered(&self, service_id: &str) -> Result<bool, CatalogError> {
        Ok(self.services.is_empty() || self.services.contains(service_id))
    }
}
