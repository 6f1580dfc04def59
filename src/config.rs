use std::time::Duration;

use anyhow::{Context, Result};

const ENV_POLL_INTERVAL: &str = "ADWATCH_POLL_INTERVAL_SECS";
const ENV_FETCH_TIMEOUT: &str = "ADWATCH_FETCH_TIMEOUT_SECS";
const ENV_HTTP_TIMEOUT: &str = "ADWATCH_HTTP_TIMEOUT_SECS";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DELIVERY_SPACING: Duration = Duration::from_secs(3);
const INTER_SOURCE_DELAY: Duration = Duration::from_secs(2);

/// Timing knobs for the watch loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// Bound on one source's candidate fetch.
    pub fetch_timeout: Duration,
    /// Per-request timeout for site and Bot API HTTP calls.
    pub http_timeout: Duration,
    pub delivery_spacing: Duration,
    pub inter_source_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            delivery_spacing: DELIVERY_SPACING,
            inter_source_delay: INTER_SOURCE_DELAY,
        }
    }
}

impl WatchConfig {
    /// Defaults overridden by environment; a set but malformed value is an error.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(d) = secs_from_env(ENV_POLL_INTERVAL)? {
            cfg.poll_interval = d;
        }
        if let Some(d) = secs_from_env(ENV_FETCH_TIMEOUT)? {
            cfg.fetch_timeout = d;
        }
        if let Some(d) = secs_from_env(ENV_HTTP_TIMEOUT)? {
            cfg.http_timeout = d;
        }
        Ok(cfg)
    }
}

fn secs_from_env(key: &str) -> Result<Option<Duration>> {
    let Ok(raw) = std::env::var(key) else { return Ok(None) };
    let secs: u64 = raw.trim().parse().with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
    if secs == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Some(Duration::from_secs(secs)))
}
