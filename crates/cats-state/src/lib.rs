//! cats-state — the snapshot store shared by the aggregator and selector.
//!
//! # Architecture
//!
//! ```text
//! MetricsAggregator ──replace()──▶ SnapshotStore ──read()──▶ PathSelector
//!                                   (ArcSwap<Snapshot>)       /sync handler
//! ```
//!
//! A `Snapshot` is built once per aggregation cycle and never modified
//! afterwards. `replace()` swaps the pointer to the whole snapshot, so a
//! reader holds either the old or the new one and never a mix.
//!
//! The `SnapshotStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<ArcSwap<_>>`) and is constructed once at startup and handed to
//! every component that needs it.

pub mod snapshot;
pub mod store;

pub use snapshot::Snapshot;
pub use store::SnapshotStore;
