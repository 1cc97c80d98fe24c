//! Credential service client.
//!
//! One GET against a third-party TURN credential service. No state, no retries.
//! The service may answer with a bare list of ICE servers or with
//! `{"iceServers": [...]}`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::debug;
use serde::Deserialize;
use url::Url;

use super::IceServerConfig;
use crate::error::{Result, SignalingError};

#[derive(Deserialize)]
#[serde(untagged)]
enum IceServersResponse {
    List(Vec<IceServerConfig>),
    Wrapped {
        #[serde(rename = "iceServers")]
        ice_servers: Vec<IceServerConfig>,
    },
}

/// Parse a credential service response body.
pub fn parse_ice_servers(body: &[u8]) -> Result<Vec<IceServerConfig>> {
    let response: IceServersResponse = serde_json::from_slice(body)?;
    Ok(match response {
        IceServersResponse::List(servers) => servers,
        IceServersResponse::Wrapped { ice_servers } => ice_servers,
    })
}

/// Fetch ICE servers from the credential service at `url`.
pub async fn fetch_ice_servers(url: &Url) -> Result<Vec<IceServerConfig>> {
    // Create HTTP client with webpki roots for TLS
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(https);

    let request = Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .header("Accept", "application/json")
        .body(Full::new(Bytes::new()))
        .map_err(|e| SignalingError::Http(format!("Failed to build request: {}", e)))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| SignalingError::Http(format!("Credential request failed: {}", e)))?;

    let status = response.status();

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| SignalingError::Http(format!("Failed to read response body: {}", e)))?
        .to_bytes();

    if !status.is_success() {
        return Err(SignalingError::CredentialStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body_bytes).to_string(),
        });
    }

    let servers = parse_ice_servers(&body_bytes)?;
    debug!("Credential service returned {} ICE server(s)", servers.len());
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_list() {
        let body = br#"[
            {"urls": "stun:stun.relay.example.com:80"},
            {"urls": "turn:global.relay.example.com:80", "username": "f8a1", "credential": "s3cr3t"}
        ]"#;
        let servers = parse_ice_servers(body).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].username.as_deref(), Some("f8a1"));
    }

    #[test]
    fn test_parse_wrapped_list() {
        let body = br#"{"iceServers": [{"urls": ["turn:a:3478", "turns:a:5349"], "username": "u", "credential": "c"}]}"#;
        let servers = parse_ice_servers(body).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls.len(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_ice_servers(b"<html>rate limited</html>").is_err());
        assert!(parse_ice_servers(br#"{"error": "bad key"}"#).is_err());
    }
}
