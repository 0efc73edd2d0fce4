//! Immutable per-cycle view of every known service instance.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use cats_core::{ServiceId, ServiceInstance};

/// The complete set of service instances gathered by one aggregation
/// cycle, keyed by service id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Aggregation cycle that produced this snapshot (0 = startup).
    cycle: u64,
    /// Unix timestamp (seconds) when the cycle finished.
    completed_at: u64,
    services: BTreeMap<ServiceId, Vec<ServiceInstance>>,
}

impl Snapshot {
    /// Empty snapshot installed at startup.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(cycle: u64, services: BTreeMap<ServiceId, Vec<ServiceInstance>>) -> Self {
        Self {
            cycle,
            completed_at: epoch_secs(),
            services,
        }
    }

    /// Build a snapshot from a flat list, grouping by service id and
    /// keeping first-seen order within each group.
    pub fn from_instances(cycle: u64, instances: impl IntoIterator<Item = ServiceInstance>) -> Self {
        let mut services: BTreeMap<ServiceId, Vec<ServiceInstance>> = BTreeMap::new();
        for inst in instances {
            services.entry(inst.service_id.clone()).or_default().push(inst);
        }
        Self::new(cycle, services)
    }

    /// Instances of a service, empty if the service is unknown.
    pub fn instances(&self, service_id: &str) -> &[ServiceInstance] {
        self.services
            .get(service_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn services(&self) -> &BTreeMap<ServiceId, Vec<ServiceInstance>> {
        &self.services
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn completed_at(&self) -> u64 {
        self.completed_at
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn instance_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
