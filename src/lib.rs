//! match-relay: anonymous one-to-one matchmaking and WebRTC signaling relay.
//!
//! Pairs two unacquainted WebSocket connections in strict arrival order, then
//! relays their SDP offers/answers and ICE candidates until either side leaves.
//!
//! ## Features
//!
//! - **FIFO matchmaking**: the longest-waiting connection is always matched first
//! - **Opaque relay**: offer, answer and ice-candidate payloads are forwarded untouched
//! - **Next / disconnect**: partner is notified exactly once, state is cleaned on every exit path
//! - **ICE endpoint**: STUN defaults or TURN credentials proxied from a credential service

pub mod config;
pub mod error;
pub mod ice;
pub mod pairing;
pub mod registry;
pub mod signaling;

pub use config::ServerConfig;
pub use error::{Result, SignalingError};
pub use ice::{google_stun_servers, IceServerConfig, IceServerSource};
pub use pairing::{MatchEngine, MatchOutcome, RelayPolicy};
pub use registry::{ConnectionId, ConnectionRegistry, Registry};
pub use signaling::{IceEndpoint, InboundEvent, OutboundEvent, SignalingServer};
