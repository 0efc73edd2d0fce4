//! The probing seam used by the path selector.

use std::future::Future;
use std::time::Duration;

use cats_core::config::SelectorSettings;
use tracing::debug;

use crate::http::http_probe;
use crate::latency::measure_delay;

/// Liveness and latency probing of service instances.
///
/// The selector spawns one task per instance, so implementations must be
/// shareable across tasks.
pub trait Prober: Send + Sync + 'static {
    /// Whether the instance at `address` answers with a 2xx in time.
    fn is_alive(&self, address: &str) -> impl Future<Output = bool> + Send;

    /// Average network delay to `address` in ms, `None` if every probe failed.
    fn network_delay(&self, address: &str) -> impl Future<Output = Option<u64>> + Send;
}

/// Probes real instances: HTTP GET for liveness, timed TCP connects for delay.
#[derive(Debug, Clone)]
pub struct NetProber {
    liveness_path: String,
    liveness_timeout: Duration,
    probe_count: u32,
    probe_timeout: Duration,
}

impl NetProber {
    pub fn new(settings: &SelectorSettings) -> Self {
        Self {
            liveness_path: settings.liveness_path.clone(),
            liveness_timeout: settings.liveness_timeout,
            probe_count: settings.probe_count,
            probe_timeout: settings.probe_timeout,
        }
    }
}

impl Prober for NetProber {
    async fn is_alive(&self, address: &str) -> bool {
        http_probe(address, &self.liveness_path, self.liveness_timeout)
            .await
            .is_healthy()
    }

    async fn network_delay(&self, address: &str) -> Option<u64> {
        let measurement = measure_delay(address, self.probe_count, self.probe_timeout).await;
        let average_ms = measurement.average_ms();
        debug!(
            %address,
            attempts = measurement.attempts,
            failures = measurement.failures(),
            ?average_ms,
            "latency measured"
        );
        average_ms
    }
}
