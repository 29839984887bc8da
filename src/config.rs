//! Runtime configuration read from `EMBEDSTORE_*` environment variables.
//!
//! Unset or empty variables fall back to defaults; values that do not parse
//! are errors rather than silently ignored.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::embedder::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_WARMUP_MARGIN, RetryPolicy};
use crate::provider::{DEFAULT_PROVIDER_URL, DEFAULT_TIMEOUT};

pub const DEFAULT_SNAPSHOT: &str = "data/embeddings.json";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_TOP_K: usize = 5;

/// Everything the binary needs to build a pipeline and serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub snapshot: PathBuf,
    pub bind: String,
    pub provider_url: String,
    pub api_token: Option<String>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT),
            bind: DEFAULT_BIND.to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            api_token: None,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let retries = parse_or("EMBEDSTORE_RETRIES", get("EMBEDSTORE_RETRIES"), DEFAULT_RETRIES)?;
        let delay_ms = parse_or(
            "EMBEDSTORE_RETRY_DELAY_MS",
            get("EMBEDSTORE_RETRY_DELAY_MS"),
            DEFAULT_RETRY_DELAY.as_millis() as u64,
        )?;
        let margin_ms = parse_or(
            "EMBEDSTORE_WARMUP_MARGIN_MS",
            get("EMBEDSTORE_WARMUP_MARGIN_MS"),
            DEFAULT_WARMUP_MARGIN.as_millis() as u64,
        )?;
        let timeout_secs = parse_or(
            "EMBEDSTORE_TIMEOUT_SECS",
            get("EMBEDSTORE_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT.as_secs(),
        )?;
        let top_k = parse_or("EMBEDSTORE_TOP_K", get("EMBEDSTORE_TOP_K"), DEFAULT_TOP_K)?;

        Ok(Self {
            snapshot: get("EMBEDSTORE_SNAPSHOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT)),
            bind: get("EMBEDSTORE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            provider_url: get("EMBEDSTORE_PROVIDER_URL").unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            api_token: get("EMBEDSTORE_API_TOKEN"),
            retry: RetryPolicy::new(
                retries,
                Duration::from_millis(delay_ms),
                Duration::from_millis(margin_ms),
            ),
            timeout: Duration::from_secs(timeout_secs),
            top_k,
        })
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid {} value: {}", name, value)),
        None => Ok(default),
    }
}
