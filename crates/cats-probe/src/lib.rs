//! cats-probe — network probes used by the aggregator and the selector.
//!
//! Provides a scoped HTTP/1 GET (metrics polls and `/sync` mirroring),
//! an HTTP liveness probe, and an in-process TCP round-trip probe for
//! latency measurement. Every call carries an explicit timeout.
//!
//! # Architecture
//!
//! ```text
//! get() / get_url() ─▶ HttpResponse { status, body }   (connection closed on return)
//! http_probe()      ─▶ ProbeResult
//! measure_delay()   ─▶ DelayMeasurement (N timed TCP connects)
//!
//! Prober (trait)    ─▶ NetProber wires the probes to SelectorSettings
//! ```

pub mod http;
pub mod latency;
pub mod prober;

pub use http::{get, get_url, http_probe, FetchError, HttpResponse, ProbeResult};
pub use latency::{measure_delay, tcp_round_trip, DelayMeasurement};
pub use prober::{NetProber, Prober};
