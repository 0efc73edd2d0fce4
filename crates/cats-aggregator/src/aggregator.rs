//! Metrics aggregator: polls every site each cycle and installs the
//! result as the new snapshot.
//!
//! A cycle fans out one task per site into a `JoinSet`, with a semaphore
//! capping how many polls are in flight. Each poll, including any time
//! spent queued for a permit, is bounded by the poll timeout, so a cycle
//! takes about one poll timeout no matter how many sites hang. The cycle then joins every task and calls
//! `SnapshotStore::replace` exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use cats_core::config::AggregatorSettings;
use cats_core::{ServiceInstance, Site};
use cats_probe::{get_url, FetchError};
use cats_state::{Snapshot, SnapshotStore};

use crate::error::PollError;
use crate::payload::decode_site_metrics;
use crate::registry::SiteRegistry;

/// Floor for run-loop periods; `tokio::time::interval` rejects zero.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Summary of one aggregation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycle: u64,
    pub sites: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub services: usize,
    pub instances: usize,
    pub elapsed: Duration,
}

/// Periodically rebuilds the snapshot store from live site metrics.
pub struct MetricsAggregator<R> {
    registry: R,
    store: SnapshotStore,
    settings: AggregatorSettings,
    /// Number of the last cycle started.
    cycle: AtomicU64,
}

impl<R: SiteRegistry> MetricsAggregator<R> {
    pub fn new(registry: R, store: SnapshotStore, settings: AggregatorSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            cycle: AtomicU64::new(0),
        }
    }

    /// Poll every registered site once and replace the snapshot with
    /// what this cycle gathered.
    pub async fn run_cycle(&self) -> CycleStats {
        let started = Instant::now();
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;

        let sites = match self.registry.sites().await {
            Ok(sites) => sites,
            Err(e) => {
                warn!(cycle, error = %e, "site registry unavailable, publishing empty snapshot");
                Vec::new()
            }
        };
        let site_count = sites.len();

        let results = poll_all(
            sites,
            self.settings.poll_timeout,
            self.settings.max_concurrent_polls,
        )
        .await;

        let mut succeeded = 0;
        let mut instances: Vec<ServiceInstance> = Vec::new();
        for (site, result) in results {
            match result {
                Ok(found) => {
                    debug!(cycle, site = %site.name, instances = found.len(), "site polled");
                    succeeded += 1;
                    instances.extend(found);
                }
                Err(e) => {
                    warn!(cycle, site = %site.name, url = %site.metrics_url, error = %e, "site skipped this cycle");
                }
            }
        }

        let snapshot = Snapshot::from_instances(cycle, instances);
        let stats = CycleStats {
            cycle,
            sites: site_count,
            succeeded,
            failed: site_count - succeeded,
            services: snapshot.service_count(),
            instances: snapshot.instance_count(),
            elapsed: started.elapsed(),
        };
        self.store.replace(snapshot);

        info!(
            cycle,
            sites = stats.sites,
            ok = stats.succeeded,
            failed = stats.failed,
            services = stats.services,
            instances = stats.instances,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "aggregation cycle complete"
        );
        stats
    }

    /// Run cycles on the configured interval until shutdown.
    ///
    /// The first cycle starts immediately. A cycle runs to completion
    /// before the next tick is awaited, so cycles never overlap; a cycle
    /// that outlasts the interval delays the next one instead of
    /// queueing a burst.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            poll_timeout_ms = self.settings.poll_timeout.as_millis() as u64,
            "metrics aggregator started"
        );

        let mut ticker = tokio::time::interval(self.settings.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    info!("metrics aggregator shutting down");
                    break;
                }
            }
        }
    }
}

/// Fetch and decode one site's metrics.
pub async fn poll_site(site: &Site, timeout: Duration) -> Result<Vec<ServiceInstance>, PollError> {
    let resp = get_url(&site.metrics_url, timeout).await?.ensure_success()?;
    decode_site_metrics(site, &resp.body)
}

/// Poll all sites concurrently, at most `limit` at a time, and return the
/// results in site order once every poll has finished. Every poll, queued
/// or running, is cut off `timeout` after the cycle starts.
async fn poll_all(
    sites: Vec<Site>,
    timeout: Duration,
    limit: usize,
) -> Vec<(Site, Result<Vec<ServiceInstance>, PollError>)> {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, site) in sites.into_iter().enumerate() {
        let permits = permits.clone();
        tasks.spawn(async move {
            // Queueing for a permit counts against the poll timeout.
            let polled = tokio::time::timeout(timeout, async {
                let _permit = permits.acquire_owned().await;
                poll_site(&site, timeout).await
            })
            .await;
            let result = polled.unwrap_or_else(|_| Err(PollError::Fetch(FetchError::Timeout(timeout))));
            (idx, site, result)
        });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(done) => results.push(done),
            Err(e) => error!(error = %e, "site poll task failed"),
        }
    }

    results.sort_by_key(|(idx, _, _)| *idx);
    results
        .into_iter()
        .map(|(_, site, result)| (site, result))
        .collect()
}
