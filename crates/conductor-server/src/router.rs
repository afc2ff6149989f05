//! HTTP router configuration.
//!
//! Built-in endpoints are registered explicitly; everything else falls
//! through to the instrument handler, which consults the route table.

use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{handle_instrument, health_check, stats};
use crate::state::AppState;

/// Build the application router.
///
/// Routes:
/// - `GET /health` - Health check
/// - `GET /stats`  - Server and cache statistics
/// - `* <path>`    - Dispatch to the instrument configured for `<path>`
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .fallback(handle_instrument)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use conductor_common::ConfigFile;
    use tower::util::ServiceExt;

    fn router_for(config: &str) -> Router {
        let config = ConfigFile::from_toml(config).unwrap();
        let state = AppState::from_config(&config).unwrap();
        build_router(state, Duration::from_secs(30))
    }

    fn no_route_config() -> &'static str {
        r#"
        [runtime.engine]
        pooling_allocator = false
        epoch_interruption = false
        "#
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = router_for(no_route_config());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats() {
        let app = router_for(no_route_config());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = router_for(no_route_config());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_instrument_dispatch_end_to_end() {
        // Writes "hello" to stdout via WASI
        let wat = r#"
            (module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func $fd_write (param i32 i32 i32 i32) (result i32)))
                (memory (export "memory") 1)
                (data (i32.const 8) "hello")
                (func (export "_start")
                    (i32.store (i32.const 0) (i32.const 8))
                    (i32.store (i32.const 4) (i32.const 5))
                    (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20))
                    drop))
        "#;

        let dir = tempfile::tempdir().unwrap();
        let module_path = dir.path().join("hello.wasm");
        std::fs::write(&module_path, wat::parse_str(wat).unwrap()).unwrap();

        let config = format!(
            r#"
            [runtime.engine]
            pooling_allocator = false
            epoch_interruption = false

            [routes."/hello"]
            wasm_file = "{}"
            "#,
            module_path.display()
        );
        let app = router_for(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hello?name=Alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_missing_module_file_is_500() {
        let config = r#"
            [runtime.engine]
            pooling_allocator = false
            epoch_interruption = false

            [routes."/ghost"]
            wasm_file = "/no/such/module.wasm"
        "#;
        let app = router_for(config);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
