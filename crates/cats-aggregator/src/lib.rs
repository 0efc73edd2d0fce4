//! cats-aggregator — keeps the snapshot store fresh from live site data.
//!
//! Once per interval the aggregator asks the site registry for the
//! current site list, polls every site's metrics endpoint concurrently
//! under a per-call timeout, waits for all polls to finish, and replaces
//! the snapshot with exactly what that cycle gathered.
//!
//! # Architecture
//!
//! ```text
//! MetricsAggregator::run()            (one cycle at a time, never overlapping)
//!   └── run_cycle()
//!       ├── SiteRegistry::sites()     → Vec<Site>
//!       ├── JoinSet fan-out           (bounded by a semaphore)
//!       │   └── poll_site()           → get_url() + decode_site_metrics()
//!       ├── join barrier
//!       └── SnapshotStore::replace()  exactly once
//!
//! SnapshotMirror::run()               (split deployment: follow a remote /sync)
//! ```
//!
//! Failed or slow sites are logged and left out of that cycle's snapshot;
//! nothing a single site does can abort a cycle or the loop.

pub mod aggregator;
pub mod error;
pub mod mirror;
pub mod payload;
pub mod registry;

pub use aggregator::{poll_site, CycleStats, MetricsAggregator};
pub use error::{MirrorError, PollError, RegistryError};
pub use mirror::{SnapshotMirror, STALE_AFTER_ROUNDS};
pub use payload::{decode_site_metrics, MetricsPayload, SiteMetric};
pub use registry::{SiteRegistry, StaticSiteRegistry};
