//! Error types for configuration loading.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading or validating `cats.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid metrics url for site {site}: {url:?}")]
    InvalidUrl { site: String, url: String },

    #[error("invalid address for site {site}: {address:?}")]
    InvalidAddress { site: String, address: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("selector.request_deadline {deadline:?} is shorter than liveness_timeout + probe_timeout ({required:?})")]
    DeadlineTooShort { deadline: Duration, required: Duration },
}
