//! Run the matchmaking signaling server.
//!
//! Usage:
//! ```bash
//! PORT=5001 HTTP_PORT=5002 RUST_LOG=info cargo run --example match_server
//! ```
//!
//! Set `ICE_SERVERS_URL` to proxy TURN credentials, and `RELAY_POLICY=paired`
//! to only relay between matched partners.

use std::sync::Arc;

use match_relay::{
    ConnectionRegistry, IceEndpoint, IceServerSource, MatchEngine, ServerConfig, SignalingServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env()?;
    log::info!("Starting match-relay with {:?}", config);

    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(MatchEngine::new(registry, config.relay_policy));

    let mut ice_endpoint = match config.http_addr() {
        Some(addr) => {
            let source = IceServerSource::from_url(config.ice_servers_url.clone());
            let mut endpoint = IceEndpoint::new(addr, source, engine.clone());
            endpoint.start().await?;
            Some(endpoint)
        }
        None => None,
    };

    let server = Arc::new(SignalingServer::new(config.ws_addr(), engine));

    let stopper = server.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        stopper.stop();
    })?;

    server.run().await?;

    if let Some(endpoint) = ice_endpoint.as_mut() {
        endpoint.stop();
    }

    Ok(())
}
