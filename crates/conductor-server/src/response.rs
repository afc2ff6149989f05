//! HTTP response builders.
//!
//! Instrument output is an opaque byte stream; the front end forwards it
//! without parsing or a content type. Errors are opaque JSON bodies.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use bytes::Bytes;

/// Forward instrument output verbatim with a 200 status.
pub fn instrument_output(bytes: Bytes) -> Response<Body> {
    Response::new(Body::from(bytes))
}

/// Opaque JSON error body.
pub fn error(status: StatusCode, message: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": message }).to_string();

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::from("internal server error"));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
