//! WebSocket Signaling Server
//!
//! Transport for the matchmaking engine. Each accepted socket becomes one
//! connection in the [`ConnectionRegistry`]; text frames are decoded into
//! inbound events and handed to the [`MatchEngine`], and anything the engine
//! sends back is written out by a per-connection writer task.
//!
//! Message flow:
//! 1. Browser A connects to ws://server:5001 and sends `find_match`
//! 2. Browser B connects and sends `find_match`; both receive `match_found`
//! 3. A sends `offer` targeting B, B answers with `answer` targeting A
//! 4. ICE candidates are relayed the same way
//! 5. When either side sends `next` or closes the socket, the other receives `disconnect_peer`

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};

use super::protocol::InboundEvent;
use crate::error::Result;
use crate::pairing::MatchEngine;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// How often the accept loop checks the running flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Signaling server that feeds WebSocket connections into the matchmaking engine
pub struct SignalingServer {
    addr: SocketAddr,
    engine: Arc<MatchEngine<ConnectionRegistry>>,
    running: Arc<AtomicBool>,
}

impl SignalingServer {
    /// Create a new signaling server for the given address
    pub fn new(addr: SocketAddr, engine: Arc<MatchEngine<ConnectionRegistry>>) -> Self {
        Self {
            addr,
            engine,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn engine(&self) -> &Arc<MatchEngine<ConnectionRegistry>> {
        &self.engine
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of open signaling connections
    pub fn connection_count(&self) -> usize {
        self.engine.registry().connection_count()
    }

    /// Stop accepting connections. Existing connections run until they close.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Bind the configured address and serve until stopped
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("[SignalingServer] Listening on ws://{}", listener.local_addr()?);

        while self.running.load(Ordering::SeqCst) {
            // Use timeout to allow checking running flag
            let accept_result = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await;

            match accept_result {
                Ok(Ok((stream, addr))) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, engine).await {
                            debug!("[SignalingServer] Connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!("[SignalingServer] Accept error: {}", e);
                }
                Err(_) => {
                    // Timeout - just continue to check running flag
                }
            }
        }

        info!("[SignalingServer] Stopped");
        Ok(())
    }
}

/// Handle a single WebSocket connection from handshake to cleanup
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    engine: Arc<MatchEngine<ConnectionRegistry>>,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let registry = engine.registry().clone();
    let (id, mut rx) = registry.register();

    info!("[SignalingServer] User connected: {} from {}", id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Forward engine events from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("[SignalingServer] Failed to encode event for {}: {}", id, e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let result = read_events(id, &mut ws_receiver, &engine).await;

    // Cleanup runs on every exit path, before the writer is torn down
    let cleanup = engine.disconnect(id);
    registry.unregister(id);
    send_task.abort();

    info!(
        "[SignalingServer] User disconnected: {} (partner notified: {:?}, was waiting: {})",
        id, cleanup.former_partner, cleanup.was_waiting
    );

    result
}

/// Decode frames and dispatch them until the socket closes
async fn read_events<S>(
    id: ConnectionId,
    ws_receiver: &mut S,
    engine: &MatchEngine<ConnectionRegistry>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result? {
            Message::Text(text) => match InboundEvent::decode(&text) {
                Ok(event) => engine.handle(id, event),
                Err(e) => debug!("[SignalingServer] Dropping malformed event from {}: {}", id, e),
            },
            Message::Binary(_) => {
                debug!("[SignalingServer] Dropping binary frame from {}", id);
            }
            Message::Close(_) => break,
            // Ping/pong handled by tungstenite, raw frames ignored
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::RelayPolicy;
    use crate::signaling::protocol::{OutboundEvent, SdpForward};
    use serde_json::json;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (Arc<SignalingServer>, SocketAddr) {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(MatchEngine::new(registry, RelayPolicy::Trusting));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(SignalingServer::new(addr, engine));
        let serving = server.clone();
        tokio::spawn(async move { serving.serve(listener).await });
        (server, addr)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, value: serde_json::Value) {
        ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> OutboundEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_server_creation() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(MatchEngine::new(registry, RelayPolicy::Trusting));
        let server = SignalingServer::new("127.0.0.1:5001".parse().unwrap(), engine);
        assert!(!server.is_running());
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_match_relay_and_peer_disconnect() {
        let (server, addr) = start().await;

        let mut a = connect(addr).await;
        send(&mut a, json!({"event": "find_match"})).await;
        wait_for(|| server.engine().stats().waiting == 1).await;

        let mut b = connect(addr).await;
        send(&mut b, json!({"event": "find_match"})).await;

        let OutboundEvent::MatchFound(b_id) = recv(&mut a).await else {
            panic!("expected match_found for a");
        };
        let OutboundEvent::MatchFound(a_id) = recv(&mut b).await else {
            panic!("expected match_found for b");
        };
        assert_ne!(a_id, b_id);

        let sdp = json!({"type": "offer", "sdp": "v=0\r\n"});
        send(&mut a, json!({"event": "offer", "data": {"target": b_id, "sdp": sdp}})).await;
        assert_eq!(
            recv(&mut b).await,
            OutboundEvent::Offer(SdpForward { sdp, sender: a_id })
        );

        b.close(None).await.unwrap();
        assert_eq!(recv(&mut a).await, OutboundEvent::PeerDisconnected);

        wait_for(|| server.connection_count() == 1).await;
        let engine = server.engine();
        assert_eq!(engine.partner_of(a_id), None);
        assert_eq!(engine.partner_of(b_id), None);
        assert_eq!(engine.check_invariants(), Ok(()));

        server.stop();
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_close_connection() {
        let (server, addr) = start().await;

        let mut a = connect(addr).await;
        a.send(Message::Text("not json".to_string())).await.unwrap();
        send(&mut a, json!({"event": "offer", "data": {"sdp": "missing target"}})).await;
        a.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        send(&mut a, json!({"event": "find_match"})).await;

        let mut b = connect(addr).await;
        send(&mut b, json!({"event": "find_match"})).await;
        assert!(matches!(recv(&mut a).await, OutboundEvent::MatchFound(_)));
        assert!(matches!(recv(&mut b).await, OutboundEvent::MatchFound(_)));

        server.stop();
    }

    #[tokio::test]
    async fn test_next_requeues_and_notifies() {
        let (server, addr) = start().await;

        let mut a = connect(addr).await;
        send(&mut a, json!({"event": "find_match"})).await;
        wait_for(|| server.engine().stats().waiting == 1).await;
        let mut b = connect(addr).await;
        send(&mut b, json!({"event": "find_match"})).await;
        recv(&mut a).await;
        let OutboundEvent::MatchFound(a_id) = recv(&mut b).await else {
            panic!("expected match_found");
        };

        send(&mut a, json!({"event": "next"})).await;
        assert_eq!(recv(&mut b).await, OutboundEvent::PeerDisconnected);
        wait_for(|| server.engine().waiting() == vec![a_id]).await;

        let mut c = connect(addr).await;
        send(&mut c, json!({"event": "find_match"})).await;
        assert_eq!(recv(&mut c).await, OutboundEvent::MatchFound(a_id));

        server.stop();
    }

    #[tokio::test]
    async fn test_dropped_socket_while_waiting_is_cleaned_up() {
        let (server, addr) = start().await;

        let mut a = connect(addr).await;
        send(&mut a, json!({"event": "find_match"})).await;
        wait_for(|| server.engine().stats().waiting == 1).await;

        // No close frame, the TCP stream just goes away
        drop(a);

        wait_for(|| server.connection_count() == 0).await;
        assert!(server.engine().waiting().is_empty());
        assert_eq!(server.engine().check_invariants(), Ok(()));

        server.stop();
    }

    #[tokio::test]
    async fn test_dropped_socket_while_paired_notifies_partner() {
        let (server, addr) = start().await;

        let mut a = connect(addr).await;
        send(&mut a, json!({"event": "find_match"})).await;
        wait_for(|| server.engine().stats().waiting == 1).await;
        let mut b = connect(addr).await;
        send(&mut b, json!({"event": "find_match"})).await;

        let OutboundEvent::MatchFound(b_id) = recv(&mut a).await else {
            panic!("expected match_found for a");
        };
        let OutboundEvent::MatchFound(a_id) = recv(&mut b).await else {
            panic!("expected match_found for b");
        };

        drop(b);

        assert_eq!(recv(&mut a).await, OutboundEvent::PeerDisconnected);
        wait_for(|| server.connection_count() == 1).await;
        assert_eq!(server.engine().partner_of(a_id), None);
        assert_eq!(server.engine().partner_of(b_id), None);
        assert!(server.engine().waiting().is_empty());

        drop(a);
        wait_for(|| server.connection_count() == 0).await;
        assert_eq!(server.engine().stats().pairs, 0);
        assert_eq!(server.engine().check_invariants(), Ok(()));

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_accept_loop() {
        let (server, _addr) = start().await;
        wait_for(|| server.is_running()).await;
        server.stop();
        assert!(!server.is_running());
    }
}
