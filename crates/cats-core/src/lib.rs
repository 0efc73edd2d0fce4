//! cats-core — shared types and configuration for the CATS control plane.
//!
//! Everything the aggregator, selector, and API agree on lives here:
//! service instance records as sites report them, client requests,
//! selection results, the configured site list, and `cats.toml` parsing.

pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_duration, CatsConfig};
pub use error::ConfigError;
pub use types::*;
