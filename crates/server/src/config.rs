//! Relay configuration from environment variables.

use std::net::SocketAddr;

use anyhow::Context;

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub addr: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ALERTA_RELAY_ADDR`: listen address (default: "0.0.0.0:8080")
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("ALERTA_RELAY_ADDR") {
            Ok(addr) => Self::parse(&addr),
            Err(_) => Ok(Self::default()),
        }
    }

    fn parse(addr: &str) -> anyhow::Result<Self> {
        let addr = addr
            .trim()
            .parse()
            .with_context(|| format!("ALERTA_RELAY_ADDR is not a socket address: {}", addr))?;
        Ok(Self { addr })
    }
}
