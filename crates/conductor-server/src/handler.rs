//! Request handlers.
//!
//! The instrument handler is the router's fallback: any path not claimed
//! by a built-in endpoint is looked up in the route table and dispatched
//! to its instrument. Unknown paths answer 404 without ever invoking the
//! dispatcher.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Response, StatusCode, Uri};
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{error, info, instrument};

use conductor_common::DispatchError;
use conductor_core::{MetricsSnapshot, ModuleCacheStats, ResponseCacheStats};

use crate::response;
use crate::state::AppState;

/// Parse a raw query string into a params map, first value wins.
///
/// Keys and values are percent-decoded; the raw string itself is only
/// used for fingerprinting inside the dispatcher.
pub fn parse_params(raw_query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(raw_query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

/// Dispatch a request to the instrument configured for its path.
#[instrument(skip(state, uri), fields(path = %uri.path()))]
pub async fn handle_instrument(
    State(state): State<AppState>,
    uri: Uri,
) -> Response<Body> {
    let start = Instant::now();
    let path = uri.path().to_string();
    let raw_query = uri.query().unwrap_or("");

    let Some(route) = state.routes().resolve(&path) else {
        state.metrics().record_request(&path, false, start.elapsed());
        return response::error(StatusCode::NOT_FOUND, "not found");
    };

    let params = parse_params(raw_query);
    let result = state.dispatcher().dispatch(&route, params, raw_query).await;
    let elapsed = start.elapsed();

    match result {
        Ok(output) => {
            state.metrics().record_request(&path, true, elapsed);
            info!(
                duration_ms = elapsed.as_millis(),
                bytes = output.len(),
                "Request completed"
            );
            response::instrument_output(output)
        }
        Err(err) => {
            state.metrics().record_request(&path, false, elapsed);
            error!(
                duration_ms = elapsed.as_millis(),
                error = %err,
                "Request failed"
            );
            error_to_response(&err)
        }
    }
}

/// Map a dispatch failure to its HTTP answer.
///
/// Bodies stay opaque: failure detail goes to the log, not the client.
fn error_to_response(err: &DispatchError) -> Response<Body> {
    match err {
        DispatchError::Cancelled => {
            response::error(StatusCode::GATEWAY_TIMEOUT, "instrument timed out")
        }
        DispatchError::ModuleExit { code, stdout } => {
            // Stdout captured before the exit is diagnostic only
            error!(
                exit_code = code,
                stdout = %String::from_utf8_lossy(stdout),
                "Instrument exited with failure"
            );
            response::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
        _ => response::error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
    }
}

/// Health check handler.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Combined server and cache statistics.
#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    server: MetricsSnapshot,
    module_cache: ModuleCacheStats,
    response_cache: ResponseCacheStats,
    routes: usize,
}

/// Server statistics handler.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(StatsResponse {
        server: state.metrics().snapshot(),
        module_cache: state.dispatcher().module_cache_stats(),
        response_cache: state.dispatcher().response_cache_stats(),
        routes: state.routes().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params_basic() {
        let params = parse_params("name=Alice&n=10");
        assert_eq!(params["name"], "Alice");
        assert_eq!(params["n"], "10");
    }

    #[test]
    fn test_parse_params_first_value_wins() {
        let params = parse_params("k=first&k=second&k=third");
        assert_eq!(params.len(), 1);
        assert_eq!(params["k"], "first");
    }

    #[test]
    fn test_parse_params_percent_decoding() {
        let params = parse_params("msg=hello%20world&plus=a+b");
        assert_eq!(params["msg"], "hello world");
        assert_eq!(params["plus"], "a b");
    }

    #[test]
    fn test_parse_params_empty() {
        assert!(parse_params("").is_empty());
    }

    #[test]
    fn test_error_to_response_cancelled() {
        let resp = error_to_response(&DispatchError::Cancelled);
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_error_to_response_module_failures() {
        let resp = error_to_response(&DispatchError::trap("unreachable"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = error_to_response(&DispatchError::ModuleExit {
            code: 3,
            stdout: b"partial".to_vec(),
        });
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = error_to_response(&DispatchError::compile("bad bytes"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
