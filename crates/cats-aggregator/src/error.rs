//! Error types for site polling and mirroring.

use thiserror::Error;

use cats_probe::FetchError;

/// Why one site contributed nothing to a cycle.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed metrics payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("metrics record without service id")]
    MissingServiceId,
}

/// The site registry could not produce a site list.
#[derive(Debug, Error)]
#[error("site registry unavailable: {0}")]
pub struct RegistryError(pub String);

/// Why a `/sync` mirror round left the local snapshot untouched.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed sync payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("remote reported failure: {0}")]
    Rejected(String),
}
