//! HTTP probe and fetch logic.
//!
//! Each call opens its own HTTP/1 connection, sends one GET, and tears
//! the connection down before returning. The connection driver task is
//! owned by a guard that aborts it on drop, so the socket is released on
//! success, on error, and when the caller's timeout cancels the future.

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Empty, Limited};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

const USER_AGENT: &str = "cats-probe/0.1";

/// Largest response body read before the fetch is abandoned.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Why a GET did not produce a response body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUri(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("failed to read body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    /// Turn a non-2xx status into `FetchError::Status`.
    pub fn ensure_success(self) -> Result<Self, FetchError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status(self.status))
        }
    }
}

/// Result of a single liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint returned non-2xx.
    Unhealthy,
    /// No response: connection error or timeout.
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// Aborts the connection driver when dropped.
struct ConnGuard(JoinHandle<()>);

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// GET an absolute `http://host:port/path` URL.
pub async fn get_url(url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|_| FetchError::InvalidUri(url.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(FetchError::InvalidUri(url.to_string()));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| FetchError::InvalidUri(url.to_string()))?
        .to_string();
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    get(&authority, &path, timeout).await
}

/// GET `path` from `address` (`host:port`), reading the whole body,
/// bounded by `timeout` end to end.
pub async fn get(address: &str, path: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
    match tokio::time::timeout(timeout, fetch(address, path)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

async fn fetch(address: &str, path: &str) -> Result<HttpResponse, FetchError> {
    let stream = tokio::net::TcpStream::connect(address)
        .await
        .map_err(FetchError::Connect)?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(FetchError::Handshake)?;

    // Drive the connection in the background for the lifetime of this call.
    let _conn = ConnGuard(tokio::spawn(async move {
        let _ = conn.await;
    }));

    let req = http::Request::builder()
        .method(http::Method::GET)
        .uri(path)
        .header(http::header::HOST, address)
        .header(http::header::USER_AGENT, USER_AGENT)
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await.map_err(FetchError::Request)?;
    let status = resp.status();
    let body = Limited::new(resp.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(FetchError::Body)?
        .to_bytes();

    Ok(HttpResponse { status, body })
}

/// Perform an HTTP liveness probe against `address` + `path`.
///
/// Returns `Healthy` if the response is 2xx, `Unhealthy` for non-2xx,
/// or `Failed` if the connection fails or times out.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    match get(address, path, timeout).await {
        Ok(resp) if resp.status.is_success() => ProbeResult::Healthy,
        Ok(resp) => {
            debug!(status = %resp.status, %address, path, "liveness probe non-2xx");
            ProbeResult::Unhealthy
        }
        Err(e) => {
            debug!(error = %e, %address, path, "liveness probe failed");
            ProbeResult::Failed
        }
    }
}
