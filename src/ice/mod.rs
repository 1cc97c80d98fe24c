//! ICE (Interactive Connectivity Establishment) configuration.
//!
//! Provides helpers for configuring STUN and TURN servers, and the source
//! the HTTP endpoint hands out to browsers before they start signaling.

pub mod credentials;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::Result;

pub use credentials::{fetch_ice_servers, parse_ice_servers};

/// ICE server descriptor as understood by `RTCPeerConnection`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN-only server config
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server config with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }
}

// Credential services send `urls` either as a string or a list
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

/// Default Google STUN servers
pub fn google_stun_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun("stun:stun.l.google.com:19302"),
        IceServerConfig::stun("stun:stun1.l.google.com:19302"),
    ]
}

/// Create a STUN server config
pub fn stun_server(url: &str) -> IceServerConfig {
    IceServerConfig::stun(url)
}

/// Create a TURN server config with credentials
pub fn turn_server(url: &str, username: &str, credential: &str) -> IceServerConfig {
    IceServerConfig::turn(url, username, credential)
}

/// Where ICE servers come from
#[derive(Clone, Debug)]
pub enum IceServerSource {
    /// Fixed list, usually STUN only
    Static(Vec<IceServerConfig>),
    /// Fetched from a credential service on every request
    Remote(Url),
}

impl IceServerSource {
    /// Remote if a URL is configured, Google STUN otherwise
    pub fn from_url(url: Option<Url>) -> Self {
        match url {
            Some(url) => IceServerSource::Remote(url),
            None => IceServerSource::Static(google_stun_servers()),
        }
    }

    pub async fn resolve(&self) -> Result<Vec<IceServerConfig>> {
        match self {
            IceServerSource::Static(servers) => Ok(servers.clone()),
            IceServerSource::Remote(url) => fetch_ice_servers(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stun_serializes_without_credentials() {
        let json = serde_json::to_string(&stun_server("stun:example.org:3478")).unwrap();
        assert_eq!(json, r#"{"urls":["stun:example.org:3478"]}"#);
    }

    #[test]
    fn test_urls_accepts_string_or_list() {
        let one: IceServerConfig =
            serde_json::from_str(r#"{"urls":"turn:t.example.org:3478","username":"u","credential":"c"}"#)
                .unwrap();
        assert_eq!(one, turn_server("turn:t.example.org:3478", "u", "c"));

        let many: IceServerConfig =
            serde_json::from_str(r#"{"urls":["stun:a","stun:b"]}"#).unwrap();
        assert_eq!(many.urls, vec!["stun:a".to_string(), "stun:b".to_string()]);
    }

    #[tokio::test]
    async fn test_static_source_resolves_google_stun() {
        let servers = IceServerSource::from_url(None).resolve().await.unwrap();
        assert_eq!(servers, google_stun_servers());
    }
}
