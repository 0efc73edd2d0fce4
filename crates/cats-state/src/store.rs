//! Single-writer, many-reader holder of the current
//! [`Snapshot`].
//!
//! Backed by `ArcSwap`: `read()` is a lock-free pointer load and
//! `replace()` an atomic pointer store. Readers keep the `Arc` they
//! loaded alive for as long as they need it, so a replacement never
//! changes a snapshot out from under a reader.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::snapshot::Snapshot;

/// Thread-safe holder of the current snapshot.
#[derive(Clone)]
pub struct SnapshotStore {
    current: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Snapshot::empty())),
        }
    }

    /// Install `snapshot` as the current one and return the one it replaced.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let services = snapshot.service_count();
        let instances = snapshot.instance_count();
        let cycle = snapshot.cycle();
        let previous = self.current.swap(Arc::new(snapshot));
        debug!(cycle, services, instances, "snapshot replaced");
        previous
    }

    /// The snapshot installed at the time of the call.
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.current.load();
        f.debug_struct("SnapshotStore")
            .field("cycle", &snap.cycle())
            .field("services", &snap.service_count())
            .finish()
    }
}
