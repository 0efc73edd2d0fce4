//! Follows a remote aggregator's `/sync` endpoint.
//!
//! Used when the selector runs in its own process. Each round fetches the
//! remote snapshot and installs it locally in one `replace()`. A failed
//! round leaves the last mirrored snapshot in place; once
//! `STALE_AFTER_ROUNDS` rounds in a row have failed, every further
//! failure is logged at error level until a round succeeds.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use cats_core::SyncResponse;
use cats_probe::get_url;
use cats_state::{Snapshot, SnapshotStore};

use crate::aggregator::MIN_INTERVAL;
use crate::error::MirrorError;

/// Consecutive failed rounds after which the mirrored copy counts as stale.
pub const STALE_AFTER_ROUNDS: u32 = 3;

pub struct SnapshotMirror {
    sync_url: String,
    store: SnapshotStore,
    interval: Duration,
    timeout: Duration,
    rounds: AtomicU64,
    failed_rounds: AtomicU32,
}

impl SnapshotMirror {
    pub fn new(sync_url: impl Into<String>, store: SnapshotStore, interval: Duration, timeout: Duration) -> Self {
        Self {
            sync_url: sync_url.into(),
            store,
            interval,
            timeout,
            rounds: AtomicU64::new(0),
            failed_rounds: AtomicU32::new(0),
        }
    }

    /// Fetch the remote snapshot once. Returns the number of services
    /// installed.
    pub async fn sync_once(&self) -> Result<usize, MirrorError> {
        let result = self.fetch_and_install().await;
        match result {
            Ok(_) => self.failed_rounds.store(0, Ordering::Relaxed),
            Err(_) => {
                self.failed_rounds.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Rounds failed since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.failed_rounds.load(Ordering::Relaxed)
    }

    async fn fetch_and_install(&self) -> Result<usize, MirrorError> {
        let resp = get_url(&self.sync_url, self.timeout).await?.ensure_success()?;
        let body: SyncResponse = serde_json::from_slice(&resp.body)?;
        if !body.success {
            return Err(MirrorError::Rejected(body.msg));
        }

        let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let services = body.data.len();
        self.store.replace(Snapshot::new(round, body.data));
        debug!(round, services, url = %self.sync_url, "mirrored remote snapshot");
        Ok(services)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(url = %self.sync_url, interval_ms = self.interval.as_millis() as u64, "snapshot mirror started");

        let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        let failures = self.consecutive_failures();
                        if failures >= STALE_AFTER_ROUNDS {
                            error!(
                                url = %self.sync_url,
                                error = %e,
                                failures,
                                cycle = self.store.read().cycle(),
                                "snapshot mirror is stale, still serving last good copy"
                            );
                        } else {
                            warn!(url = %self.sync_url, error = %e, failures, "snapshot mirror round failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot mirror shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::routing::get;
    use axum::Router;

    async fn serve_sync(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/sync", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/sync")
    }

    #[tokio::test]
    async fn mirrors_remote_snapshot() {
        let url = serve_sync(
            r#"{"success":true,"msg":"ok","data":{"S1":[{"service_id":"S1","csci_id":"172.17.0.8:5000","gas":3,"cost":4,"delay":8}]}}"#,
        )
        .await;
        let store = SnapshotStore::new();
        let mirror = SnapshotMirror::new(url, store.clone(), Duration::from_secs(1), Duration::from_secs(1));

        assert_eq!(mirror.sync_once().await.unwrap(), 1);
        assert_eq!(mirror.consecutive_failures(), 0);
        let snap = store.read();
        assert_eq!(snap.cycle(), 1);
        assert_eq!(snap.instances("S1")[0].address, "172.17.0.8:5000");
    }

    #[tokio::test]
    async fn rejected_sync_keeps_previous_copy() {
        let url = serve_sync(r#"{"success":false,"msg":"not ready"}"#).await;
        let store = SnapshotStore::new();
        store.replace(Snapshot::from_instances(4, Vec::new()));
        let mirror = SnapshotMirror::new(url, store.clone(), Duration::from_secs(1), Duration::from_secs(1));

        let err = mirror.sync_once().await.unwrap_err();
        assert!(matches!(err, MirrorError::Rejected(ref msg) if msg == "not ready"));
        assert_eq!(store.read().cycle(), 4);
    }

    #[tokio::test]
    async fn malformed_sync_is_decode_error() {
        let url = serve_sync("[]").await;
        let mirror = SnapshotMirror::new(url, SnapshotStore::new(), Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(mirror.sync_once().await, Err(MirrorError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_remote_is_fetch_error() {
        let mirror = SnapshotMirror::new(
            "http://127.0.0.1:1/sync",
            SnapshotStore::new(),
            Duration::from_secs(1),
            Duration::from_millis(200),
        );
        assert!(matches!(mirror.sync_once().await, Err(MirrorError::Fetch(_))));
    }

    #[tokio::test]
    async fn consecutive_failures_count_until_success() {
        let url = serve_sync(r#"{"success":false,"msg":"warming up"}"#).await;
        let store = SnapshotStore::new();
        let mirror = SnapshotMirror::new(url, store.clone(), Duration::from_secs(1), Duration::from_secs(1));
        for _ in 0..STALE_AFTER_ROUNDS {
            assert!(mirror.sync_once().await.is_err());
        }
        assert_eq!(mirror.consecutive_failures(), STALE_AFTER_ROUNDS);

        let good = serve_sync(r#"{"success":true,"msg":"ok","data":{}}"#).await;
        let mirror_ok = SnapshotMirror::new(good, store, Duration::from_secs(1), Duration::from_secs(1));
        mirror_ok.failed_rounds.store(STALE_AFTER_ROUNDS, Ordering::Relaxed);
        assert_eq!(mirror_ok.sync_once().await.unwrap(), 0);
        assert_eq!(mirror_ok.consecutive_failures(), 0);
    }
}
