//! Server configuration loaded from environment variables.
//!
//! Variables:
//! - `BIND_ADDR`: interface to bind (default 0.0.0.0)
//! - `PORT`: WebSocket signaling port (default 5001)
//! - `HTTP_PORT`: ICE server / health endpoint port, 0 disables it (default 5002)
//! - `ICE_SERVERS_URL`: credential service URL; unset serves static STUN servers
//! - `RELAY_POLICY`: `trusting` (default) or `paired`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use url::Url;

use crate::error::{Result, SignalingError};
use crate::pairing::RelayPolicy;

/// Default WebSocket signaling port
pub const DEFAULT_PORT: u16 = 5001;

/// Default HTTP endpoint port
pub const DEFAULT_HTTP_PORT: u16 = 5002;

/// Runtime configuration for the signaling server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind both listeners to
    pub bind_addr: IpAddr,
    /// WebSocket signaling port
    pub port: u16,
    /// HTTP endpoint port (0 = disabled)
    pub http_port: u16,
    /// Credential service queried for ICE servers
    pub ice_servers_url: Option<Url>,
    /// Relay target validation
    pub relay_policy: RelayPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            http_port: DEFAULT_HTTP_PORT,
            ice_servers_url: None,
            relay_policy: RelayPolicy::Trusting,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Unset or empty variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Self::default();

        if let Some(value) = get("BIND_ADDR") {
            config.bind_addr = value
                .parse()
                .map_err(|_| SignalingError::Config(format!("Invalid BIND_ADDR: {}", value)))?;
        }

        if let Some(value) = get("PORT") {
            config.port = parse_port("PORT", &value)?;
        }

        if let Some(value) = get("HTTP_PORT") {
            config.http_port = parse_port("HTTP_PORT", &value)?;
        }

        if let Some(value) = get("ICE_SERVERS_URL") {
            let url = Url::parse(&value).map_err(|e| {
                SignalingError::Config(format!("Invalid ICE_SERVERS_URL {}: {}", value, e))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(SignalingError::Config(format!(
                    "ICE_SERVERS_URL must be http or https, got {}",
                    url.scheme()
                )));
            }
            config.ice_servers_url = Some(url);
        }

        if let Some(value) = get("RELAY_POLICY") {
            config.relay_policy = value.parse()?;
        }

        Ok(config)
    }

    /// Address of the WebSocket listener
    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Address of the HTTP listener, if enabled
    pub fn http_addr(&self) -> Option<SocketAddr> {
        (self.http_port != 0).then(|| SocketAddr::new(self.bind_addr, self.http_port))
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| SignalingError::Config(format!("Invalid {}: {}", key, value)))
}
