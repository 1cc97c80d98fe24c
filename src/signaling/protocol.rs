//! Wire protocol for the signaling channel.
//!
//! Every WebSocket text frame carries one event, adjacently tagged:
//!
//! ```json
//! {"event": "find_match"}
//! {"event": "offer", "data": {"target": 7, "sdp": {"type": "offer", "sdp": "v=0..."}}}
//! {"event": "match_found", "data": 7}
//! {"event": "disconnect_peer"}
//! ```
//!
//! Relay blobs (`sdp`, `candidate`) are arbitrary JSON and are never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::registry::ConnectionId;

/// The three relayed session-establishment kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

/// Inbound SDP relay request (offer or answer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpRelay {
    pub target: ConnectionId,
    pub sdp: Value,
}

/// Inbound ICE candidate relay request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelay {
    pub target: ConnectionId,
    pub candidate: Value,
}

/// Outbound SDP annotated with its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpForward {
    pub sdp: Value,
    pub sender: ConnectionId,
}

/// Outbound ICE candidate annotated with its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateForward {
    pub candidate: Value,
    pub sender: ConnectionId,
}

/// Events a connection sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "find_match")]
    FindMatch,
    #[serde(rename = "offer")]
    Offer(SdpRelay),
    #[serde(rename = "answer")]
    Answer(SdpRelay),
    #[serde(rename = "ice-candidate")]
    IceCandidate(CandidateRelay),
    #[serde(rename = "next")]
    Next,
}

/// A relay request with the kind-specific field names stripped away
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub target: ConnectionId,
    pub blob: Value,
}

impl InboundEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Split a relay event into kind, target and blob.
    ///
    /// Returns `None` for `find_match` and `next`.
    pub fn into_signal(self) -> Option<Signal> {
        match self {
            InboundEvent::Offer(r) => Some(Signal {
                kind: SignalKind::Offer,
                target: r.target,
                blob: r.sdp,
            }),
            InboundEvent::Answer(r) => Some(Signal {
                kind: SignalKind::Answer,
                target: r.target,
                blob: r.sdp,
            }),
            InboundEvent::IceCandidate(r) => Some(Signal {
                kind: SignalKind::IceCandidate,
                target: r.target,
                blob: r.candidate,
            }),
            InboundEvent::FindMatch | InboundEvent::Next => None,
        }
    }
}

/// Events the server sends to a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "match_found")]
    MatchFound(ConnectionId),
    #[serde(rename = "offer")]
    Offer(SdpForward),
    #[serde(rename = "answer")]
    Answer(SdpForward),
    #[serde(rename = "ice-candidate")]
    IceCandidate(CandidateForward),
    #[serde(rename = "disconnect_peer")]
    PeerDisconnected,
}

impl OutboundEvent {
    /// Build the forwarded form of a relayed signal.
    pub fn signal(kind: SignalKind, sender: ConnectionId, blob: Value) -> Self {
        match kind {
            SignalKind::Offer => OutboundEvent::Offer(SdpForward { sdp: blob, sender }),
            SignalKind::Answer => OutboundEvent::Answer(SdpForward { sdp: blob, sender }),
            SignalKind::IceCandidate => OutboundEvent::IceCandidate(CandidateForward {
                candidate: blob,
                sender,
            }),
        }
    }

    /// Encode as one text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
