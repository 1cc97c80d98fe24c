//! Error types for match-relay.

use thiserror::Error;

/// Errors that can occur outside the matchmaking core.
///
/// The engine itself never fails: malformed events and stale targets are
/// dropped, not surfaced. These cover configuration, transport and the
/// credential service.
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Credential service returned {status}: {body}")]
    CredentialStatus { status: u16, body: String },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SignalingError>;
