//! Responses produced by the listener itself.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::proxy::pipeline::stamp_version;
use crate::proxy::ProxyError;

pub const NO_MATCH_BODY: &str = "no mapping matched the request";

/// 404 for a request no mapping claims.
pub fn no_match() -> Response {
    let mut response = (StatusCode::NOT_FOUND, NO_MATCH_BODY).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    stamp_version(response.headers_mut());
    response
}

/// Error response for a failure outside the pipeline.
pub fn failure(err: ProxyError) -> Response {
    let mut response = err.into_response();
    stamp_version(response.headers_mut());
    response
}
