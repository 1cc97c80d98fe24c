//! Signaling surfaces around the matchmaking engine.
//!
//! - `protocol`: JSON events exchanged over the WebSocket
//! - `ws_signaling_server`: WebSocket transport feeding the engine
//! - `ice_endpoint`: HTTP endpoint serving ICE servers and health

pub mod ice_endpoint;
pub mod protocol;
pub mod ws_signaling_server;

pub use ice_endpoint::IceEndpoint;
pub use protocol::{InboundEvent, OutboundEvent, Signal, SignalKind};
pub use ws_signaling_server::SignalingServer;
