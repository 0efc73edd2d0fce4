//! cats.toml configuration parser.
//!
//! Every section is optional. Durations are written as strings
//! ("500ms", "5s", "2m") and resolved into [`Duration`]s by the
//! `resolve()` methods, which is where validation happens.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Site;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatsConfig {
    pub aggregator: AggregatorConfig,
    pub selector: SelectorConfig,
    pub catalog: CatalogConfig,
    pub sites: Vec<Site>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub interval: String,
    pub poll_timeout: String,
    pub max_concurrent_polls: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            poll_timeout: "5s".to_string(),
            max_concurrent_polls: 64,
        }
    }
}

/// Resolved aggregator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub interval: Duration,
    pub poll_timeout: Duration,
    pub max_concurrent_polls: usize,
}

impl AggregatorConfig {
    pub fn resolve(&self) -> Result<AggregatorSettings, ConfigError> {
        if self.max_concurrent_polls == 0 {
            return Err(ConfigError::Zero("aggregator.max_concurrent_polls"));
        }
        Ok(AggregatorSettings {
            interval: nonzero_duration_field("aggregator.interval", &self.interval)?,
            poll_timeout: nonzero_duration_field("aggregator.poll_timeout", &self.poll_timeout)?,
            max_concurrent_polls: self.max_concurrent_polls,
        })
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(5),
            max_concurrent_polls: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub liveness_path: String,
    pub liveness_timeout: String,
    pub probe_count: u32,
    pub probe_timeout: String,
    pub default_delay_ms: u64,
    pub request_deadline: String,
    pub enforce_max_delay: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            liveness_path: "/metrics".to_string(),
            liveness_timeout: "2s".to_string(),
            probe_count: 3,
            probe_timeout: "1s".to_string(),
            default_delay_ms: DEFAULT_DELAY_MS,
            request_deadline: "4s".to_string(),
            enforce_max_delay: false,
        }
    }
}

/// Delay substituted when every latency probe to a candidate fails.
pub const DEFAULT_DELAY_MS: u64 = 5;

/// Resolved selector settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSettings {
    pub liveness_path: String,
    pub liveness_timeout: Duration,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    pub default_delay_ms: u64,
    pub request_deadline: Duration,
    pub enforce_max_delay: bool,
}

impl SelectorConfig {
    pub fn resolve(&self) -> Result<SelectorSettings, ConfigError> {
        if self.probe_count == 0 {
            return Err(ConfigError::Zero("selector.probe_count"));
        }
        let liveness_path = if self.liveness_path.starts_with('/') {
            self.liveness_path.clone()
        } else {
            format!("/{}", self.liveness_path)
        };
        let liveness_timeout = nonzero_duration_field("selector.liveness_timeout", &self.liveness_timeout)?;
        let probe_timeout = nonzero_duration_field("selector.probe_timeout", &self.probe_timeout)?;
        let request_deadline = nonzero_duration_field("selector.request_deadline", &self.request_deadline)?;

        // One instance costs at most one liveness check plus one round of
        // concurrent latency probes; the deadline must cover both.
        let required = liveness_timeout + probe_timeout;
        if request_deadline < required {
            return Err(ConfigError::DeadlineTooShort {
                deadline: request_deadline,
                required,
            });
        }

        Ok(SelectorSettings {
            liveness_path,
            liveness_timeout,
            probe_count: self.probe_count,
            probe_timeout,
            default_delay_ms: self.default_delay_ms,
            request_deadline,
            enforce_max_delay: self.enforce_max_delay,
        })
    }
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            liveness_path: "/metrics".to_string(),
            liveness_timeout: Duration::from_secs(2),
            probe_count: 3,
            probe_timeout: Duration::from_secs(1),
            default_delay_ms: DEFAULT_DELAY_MS,
            request_deadline: Duration::from_secs(4),
            enforce_max_delay: false,
        }
    }
}

/// Registered service ids. An empty list accepts any id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub services: Vec<String>,
}

impl CatsConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CatsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration and site entry without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aggregator.resolve()?;
        self.selector.resolve()?;
        for site in &self.sites {
            validate_site(site)?;
        }
        Ok(())
    }
}

fn validate_site(site: &Site) -> Result<(), ConfigError> {
    let uri: http::Uri = site.metrics_url.parse().map_err(|_| ConfigError::InvalidUrl {
        site: site.name.clone(),
        url: site.metrics_url.clone(),
    })?;
    if uri.scheme_str() != Some("http") || uri.authority().is_none() {
        return Err(ConfigError::InvalidUrl {
            site: site.name.clone(),
            url: site.metrics_url.clone(),
        });
    }
    match site.address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ConfigError::InvalidAddress {
            site: site.name.clone(),
            address: site.address.clone(),
        }),
    }
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

fn nonzero_duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = duration_field(field, value)?;
    if duration.is_zero() {
        return Err(ConfigError::Zero(field));
    }
    Ok(duration)
}

/// Parse a duration string like "5s", "500ms", "2m", or "10" (seconds).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
