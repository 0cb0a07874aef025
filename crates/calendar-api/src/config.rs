// API server configuration loaded from environment variables

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use calendar_storage::StorageConfig;

use crate::calendar::DEFAULT_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub storage: StorageConfig,
    /// `API_ADDR`, default `0.0.0.0:9000`
    pub addr: SocketAddr,
    /// `REQUEST_TIMEOUT_MS`, bound for each store call
    pub request_timeout: Duration,
    /// `SHUTDOWN_GRACE_SECS`, bound for closing the store
    pub shutdown_grace: Duration,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let storage = StorageConfig::from_env().context("Invalid storage configuration")?;

        let addr = std::env::var("API_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            .parse()
            .context("API_ADDR must be a socket address")?;

        let request_timeout = match std::env::var("REQUEST_TIMEOUT_MS") {
            Ok(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .context("REQUEST_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            Err(_) => DEFAULT_TIMEOUT,
        };

        let shutdown_grace = std::env::var("SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Ok(Self {
            storage,
            addr,
            request_timeout,
            shutdown_grace,
        })
    }
}
