//! HTTP endpoint for ICE servers and health.
//!
//! Browsers call `GET /ice-servers` before opening the signaling socket so
//! they can build their `RTCPeerConnection`. Routes:
//!
//! - `GET /ice-servers` - JSON list of ICE servers (502 if the credential service fails)
//! - `GET /health` - connection and matchmaking counters
//! - `OPTIONS *` - CORS preflight

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::ice::IceServerSource;
use crate::pairing::MatchEngine;
use crate::registry::ConnectionRegistry;

/// Shared state behind every request
struct EndpointState {
    source: IceServerSource,
    engine: Arc<MatchEngine<ConnectionRegistry>>,
}

/// ICE server and health HTTP endpoint
pub struct IceEndpoint {
    addr: SocketAddr,
    state: Arc<EndpointState>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl IceEndpoint {
    /// Create a new endpoint. Nothing is bound until [`start`](Self::start).
    pub fn new(
        addr: SocketAddr,
        source: IceServerSource,
        engine: Arc<MatchEngine<ConnectionRegistry>>,
    ) -> Self {
        Self {
            addr,
            state: Arc::new(EndpointState { source, engine }),
            local_addr: None,
            shutdown_tx: None,
        }
    }

    /// Address actually bound (useful when started on port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and spawn the accept loop
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!("ICE endpoint listening on http://{}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let state = self.state.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let state = state.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let state = state.clone();
                                        async move { handle_request(req, state).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("ICE endpoint connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("ICE endpoint accept error: {}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
            info!("ICE endpoint stopped");
        });

        Ok(local_addr)
    }

    /// Stop the HTTP server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for IceEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<EndpointState>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/ice-servers") => Ok(handle_ice_servers(&state).await),

        (&Method::GET, "/health") => {
            let stats = state.engine.stats();
            let body = json!({
                "status": "ok",
                "connections": state.engine.registry().connection_count(),
                "waiting": stats.waiting,
                "pairs": stats.pairs,
            });
            Ok(json_response(StatusCode::OK, body.to_string()))
        }

        // OPTIONS - CORS preflight
        (&Method::OPTIONS, _) => Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::new()))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))),

        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "not found"}).to_string(),
        )),
    }
}

async fn handle_ice_servers(state: &EndpointState) -> Response<Full<Bytes>> {
    match state.source.resolve().await {
        Ok(servers) => match serde_json::to_string(&servers) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": e.to_string()}).to_string(),
            ),
        },
        Err(e) => {
            warn!("Failed to fetch ICE servers: {}", e);
            json_response(
                StatusCode::BAD_GATEWAY,
                json!({"error": "Failed to fetch ICE servers"}).to_string(),
            )
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ice::{google_stun_servers, IceServerConfig};
    use crate::pairing::RelayPolicy;
    use http_body_util::BodyExt;
    use hyper_util::client::legacy::Client;
    use hyper_util::rt::TokioExecutor;

    async fn get(addr: SocketAddr, path: &str) -> (StatusCode, serde_json::Value) {
        let client: Client<_, Full<Bytes>> =
            Client::builder(TokioExecutor::new()).build_http();
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://{}{}", addr, path))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = client.request(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn endpoint(source: IceServerSource) -> IceEndpoint {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(MatchEngine::new(registry, RelayPolicy::Trusting));
        IceEndpoint::new("127.0.0.1:0".parse().unwrap(), source, engine)
    }

    #[tokio::test]
    async fn test_serves_static_ice_servers() {
        let mut endpoint = endpoint(IceServerSource::Static(google_stun_servers()));
        let addr = endpoint.start().await.unwrap();

        let (status, body) = get(addr, "/ice-servers").await;
        assert_eq!(status, StatusCode::OK);
        let servers: Vec<IceServerConfig> = serde_json::from_value(body).unwrap();
        assert_eq!(servers, google_stun_servers());
        endpoint.stop();
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let mut endpoint = endpoint(IceServerSource::Static(vec![]));
        endpoint.state.engine.request_match(crate::registry::ConnectionId(1));
        let addr = endpoint.start().await.unwrap();

        let (status, body) = get(addr, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["waiting"], 1);
        assert_eq!(body["pairs"], 0);
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_unreachable_credential_service_is_bad_gateway() {
        // Nothing listens on port 9 of localhost
        let url = url::Url::parse("http://127.0.0.1:9/credentials").unwrap();
        let mut endpoint = endpoint(IceServerSource::Remote(url));
        let addr = endpoint.start().await.unwrap();

        let (status, body) = get(addr, "/ice-servers").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let mut endpoint = endpoint(IceServerSource::Static(vec![]));
        let addr = endpoint.start().await.unwrap();
        let (status, _) = get(addr, "/whatever").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
