//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Flatten each request, match it against the registry snapshot and
//!   hand the match to the pipeline

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::cache;
use crate::config::GatewayConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response;
use crate::mapping::registry::MappingRegistry;
use crate::observability::metrics;
use crate::proxy::{prepare, HttpForwarder, Pipeline, ProxyError};
use crate::routing::attributes::FlattenedAttributes;
use crate::routing::matcher::get_match;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MappingRegistry>,
    pub pipeline: Arc<Pipeline>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server backed by the configured cache and a pooled HTTP client.
    pub fn new(config: &GatewayConfig, registry: Arc<MappingRegistry>) -> Self {
        let pipeline = Pipeline::new(
            cache::from_config(&config.cache),
            Arc::new(HttpForwarder::new()),
            config.pipeline.clone(),
        );
        let state = AppState {
            registry,
            pipeline: Arc::new(pipeline),
        };
        Self::with_state(config, state)
    }

    /// Create a server around an existing state.
    pub fn with_state(config: &GatewayConfig, state: AppState) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The configured router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main gateway handler.
/// Matches the request against the registry and runs the pipeline.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request).to_string();

    let (parts, body) = request.into_parts();
    let attributes = FlattenedAttributes::from_request_parts(&parts);

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        "Matching request"
    );

    let snapshot = state.registry.get();
    let Some(mapping) = get_match(&snapshot, &attributes) else {
        tracing::info!(request_id = %request_id, path = %parts.uri.path(), "No mapping matched");
        metrics::record_request("none", 404, start_time);
        return response::no_match();
    };

    let mapping_id = mapping.id().to_string();
    let span = tracing::info_span!("gateway", request_id = %request_id, mapping = %mapping_id);
    let response = async {
        match prepare(mapping, attributes, body) {
            Ok(prepared) => state.pipeline.execute(prepared).await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to prepare request");
                response::failure(ProxyError::from(e))
            }
        }
    }
    .instrument(span)
    .await;

    tracing::debug!(
        request_id = %request_id,
        mapping = %mapping_id,
        status = response.status().as_u16(),
        "Request handled"
    );
    metrics::record_request(&mapping_id, response.status().as_u16(), start_time);
    response
}
