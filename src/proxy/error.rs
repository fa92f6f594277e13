//! Pipeline error reporting.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::mapping::template::RenderError;
use crate::proxy::forward::BackendError;
use crate::proxy::transform::TransformError;

/// Any failure that ends a request before the response is committed.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Render(_) => "render",
            ProxyError::Backend(_) => "backend",
            ProxyError::Transform(_) => "transform",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.to_string()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
