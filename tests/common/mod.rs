//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use mapping_gateway::{GatewayConfig, HttpServer, MappingRegistry};

/// A request as the mock backend received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock backend that answers every request with a fixed response.
pub async fn start_mock_backend(
    status: u16,
    content_type: &'static str,
    body: &'static str,
) -> MockBackend {
    start_programmable_backend(move |_| (status, content_type, body.to_string())).await
}

/// Start a mock backend whose response is computed from the request.
pub async fn start_programmable_backend<F>(respond: F) -> MockBackend
where
    F: Fn(&RecordedRequest) -> (u16, &'static str, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        calls: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let state = backend.clone();
    let respond = Arc::new(respond);
    let app = axum::Router::new().fallback(move |request: Request<Body>| {
        let state = state.clone();
        let respond = respond.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let recorded = RecordedRequest {
                method: parts.method.to_string(),
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            };
            state.calls.fetch_add(1, Ordering::SeqCst);
            let (status, content_type, body) = respond(&recorded);
            state.requests.lock().unwrap().push(recorded);

            Response::builder()
                .status(StatusCode::from_u16(status).unwrap())
                .header("content-type", content_type)
                .header("x-backend", "mock")
                .body(Body::from(body))
                .unwrap()
        }
    });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    backend
}

/// Address that refuses connections.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Running gateway; dropping it shuts the server down.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub registry: Arc<MappingRegistry>,
    _shutdown: oneshot::Sender<()>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register mappings from a JSON object of `id → definition`.
    pub fn register(&self, mappings: serde_json::Value) {
        self.registry
            .register(serde_json::from_value(mappings).unwrap())
            .unwrap();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let registry = Arc::new(MappingRegistry::new());
    let server = HttpServer::new(&config, registry.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = server
            .run(listener, async {
                let _ = rx.await;
            })
            .await;
    });

    TestGateway {
        addr,
        registry,
        _shutdown: tx,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
