//! cats-selector — picks the best instance of a service for one request.
//!
//! # Selection Algorithm
//!
//! ```text
//! instances = snapshot[request.service_id]          (empty if unknown)
//!
//! per instance, concurrently:
//!     alive?            HTTP GET liveness probe     (dead → excluded)
//!     cost <= max_accept_cost && capacity > 0       (else excluded)
//!     measured = avg of N TCP round trips           (all fail → default delay)
//!     total_delay = base_delay + measured
//!
//! whole fan-out bounded by request_deadline         (unfinished → excluded)
//! optional: total_delay <= max_accept_delay         (enforce_max_delay)
//!
//! rank by (cost asc, total_delay asc), ties in snapshot order
//! first → Selected, none → NoCandidate
//! ```

pub mod catalog;
pub mod selector;

pub use catalog::{CatalogError, ServiceCatalog, StaticCatalog};
pub use selector::{meets_constraints, rank_candidates, NetSelector, PathSelector};
