//! Client configuration.

use alerta_shared::{parse_endpoint, NotifyError};
use url::Url;

use crate::ws::ReconnectConfig;

/// Where the push endpoint lives when nothing else is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Push endpoint, `ws://` or `wss://`.
    pub endpoint: Url,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Accepts `ws(s)://` as well as `http(s)://` endpoints.
    pub fn new(endpoint: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            reconnect: ReconnectConfig::default(),
        })
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ALERTA_WS_URL`: push endpoint (default: "ws://localhost:8080/ws")
    /// - `ALERTA_RECONNECT_DELAY_MS`: fixed delay between reconnects (default: 3000)
    /// - `ALERTA_MAX_RECONNECT_ATTEMPTS`: 0 retries forever (default: 0)
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;

        let endpoint =
            std::env::var("ALERTA_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        let mut config = Self::new(&endpoint)?;

        if let Ok(delay) = std::env::var("ALERTA_RECONNECT_DELAY_MS") {
            let delay = delay
                .parse()
                .context("ALERTA_RECONNECT_DELAY_MS must be a number of milliseconds")?;
            config.reconnect = ReconnectConfig::fixed(delay);
        }

        if let Ok(max) = std::env::var("ALERTA_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = max
                .parse()
                .context("ALERTA_MAX_RECONNECT_ATTEMPTS must be a number")?;
        }

        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_WS_URL).expect("default endpoint is a valid URL"),
            reconnect: ReconnectConfig::default(),
        }
    }
}
