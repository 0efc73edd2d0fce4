//! Network delay measurement by timed TCP connects.
//!
//! A probe is one TCP handshake to the instance's address; the time to
//! an established connection is one round trip. Several probes run
//! concurrently and the successful ones are averaged, so a batch takes
//! at most one probe timeout.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Outcome of a batch of latency probes against one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayMeasurement {
    pub attempts: u32,
    /// Round-trip times of the probes that succeeded.
    pub samples: Vec<Duration>,
}

impl DelayMeasurement {
    /// Mean of the successful samples in whole milliseconds (truncated),
    /// or `None` when every probe failed.
    pub fn average_ms(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let total_us: u128 = self.samples.iter().map(Duration::as_micros).sum();
        let avg_us = total_us / self.samples.len() as u128;
        Some((avg_us / 1000) as u64)
    }

    pub fn failures(&self) -> u32 {
        self.attempts - self.samples.len() as u32
    }
}

/// Time a single TCP connect to `address`. `None` on error or timeout.
pub async fn tcp_round_trip(address: &str, timeout: Duration) -> Option<Duration> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => {
            let rtt = started.elapsed();
            drop(stream);
            Some(rtt)
        }
        Ok(Err(e)) => {
            debug!(error = %e, %address, "latency probe connect failed");
            None
        }
        Err(_) => {
            debug!(%address, ?timeout, "latency probe timed out");
            None
        }
    }
}

/// Run `count` concurrent round-trip probes against `address`.
pub async fn measure_delay(address: &str, count: u32, timeout: Duration) -> DelayMeasurement {
    let mut probes = JoinSet::new();
    for _ in 0..count {
        let address = address.to_string();
        probes.spawn(async move { tcp_round_trip(&address, timeout).await });
    }

    let mut samples = Vec::with_capacity(count as usize);
    while let Some(joined) = probes.join_next().await {
        if let Ok(Some(rtt)) = joined {
            samples.push(rtt);
        }
    }
    DelayMeasurement {
        attempts: count,
        samples,
    }
}
