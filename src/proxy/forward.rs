//! Backend forwarding.
//!
//! The pipeline talks to backends through [`Forwarder`], so tests can swap
//! in a fake and the gateway can use a pooled hyper client.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

/// Failure reaching a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build backend request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("backend request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// Sends a fully built request to its backend.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, BackendError>;
}

/// Forwarder backed by a pooled hyper client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, BackendError> {
        let response: Response<hyper::body::Incoming> = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
