//! Domain types shared by the aggregator, the selector, and the API.
//!
//! Field names on the wire follow the site protocol (`csci_id`, `gas`,
//! `delay`); the Rust names say what the values mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a logical service ("S1", "S2", ...).
pub type ServiceId = String;

/// One addressable deployment of a service at a site, as reported by the
/// site's metrics endpoint during a single aggregation cycle.
///
/// Instances are never mutated after a poll produces them; the next
/// cycle builds fresh ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service_id: ServiceId,
    /// Routing target (`host:port`), the CSCI-ID returned to callers.
    #[serde(rename = "csci_id", alias = "address")]
    pub address: String,
    /// Available slots.
    #[serde(rename = "gas", alias = "capacity")]
    pub capacity: u32,
    pub cost: i64,
    /// Site-local processing delay in milliseconds.
    #[serde(rename = "delay", alias = "base_delay")]
    pub base_delay_ms: u64,
}

/// A routing request from a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRequest {
    pub service_id: ServiceId,
    pub max_accept_cost: i64,
    /// Only enforced when the selector runs with `enforce_max_delay`.
    pub max_accept_delay: u64,
}

/// An instance that survived liveness and constraint filtering for one
/// request, annotated with its probed network delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub instance: ServiceInstance,
    pub measured_delay_ms: u64,
    /// `base_delay_ms + measured_delay_ms`.
    pub total_delay_ms: u64,
    /// Set when every latency probe failed and the default delay was used.
    pub delay_fallback: bool,
}

impl Candidate {
    pub fn new(instance: ServiceInstance, measured_delay_ms: u64, delay_fallback: bool) -> Self {
        let total_delay_ms = instance.base_delay_ms.saturating_add(measured_delay_ms);
        Self {
            instance,
            measured_delay_ms,
            total_delay_ms,
            delay_fallback,
        }
    }

    pub fn cost(&self) -> i64 {
        self.instance.cost
    }
}

/// The chosen instance for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub service_id: ServiceId,
    #[serde(rename = "csci_id")]
    pub address: String,
    #[serde(rename = "real_cost")]
    pub cost: i64,
    #[serde(rename = "real_delay")]
    pub delay_ms: u64,
}

impl From<&Candidate> for Selection {
    fn from(c: &Candidate) -> Self {
        Self {
            service_id: c.instance.service_id.clone(),
            address: c.instance.address.clone(),
            cost: c.instance.cost,
            delay_ms: c.total_delay_ms,
        }
    }
}

/// Outcome of one selection call. `NoCandidate` is a normal result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    Selected(Selection),
    NoCandidate,
}

impl SelectionResult {
    pub fn selection(&self) -> Option<&Selection> {
        match self {
            SelectionResult::Selected(s) => Some(s),
            SelectionResult::NoCandidate => None,
        }
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, SelectionResult::Selected(_))
    }
}

/// A remote site that exposes a metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    /// Absolute `http://host:port/path` URL of the site's metrics endpoint.
    pub metrics_url: String,
    /// Externally-known `host:port` of the site's service instance.
    /// Overrides whatever address the metrics payload claims.
    pub address: String,
}

/// Body of `GET /sync`: the aggregated instances of the latest cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub data: BTreeMap<ServiceId, Vec<ServiceInstance>>,
    #[serde(default)]
    pub msg: String,
}
