//! HTTP server for the reviewer-assignment API.
//!
//! Binds the axum router to 0.0.0.0 and serves until the shutdown token
//! fires. Shutdown is graceful: the listener stops accepting, in-flight
//! requests get [`SHUTDOWN_GRACE`] to finish, and only then is their
//! cancellation token fired.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::services::api::{api_routes, ApiErr, AppState};

/// How long in-flight requests may run after shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the full application router with its middleware stack.
pub fn build_app(state: AppState) -> Router {
    with_middleware(api_routes(state))
}

/// Request ids (`x-request-id`, generated when absent and echoed back),
/// request tracing, and panic recovery into a 500 error body.
pub fn with_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::custom(panic_response)),
    )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiErr::from(AppError::internal(format!("handler panicked: {}", detail))).into_response()
}

/// Serve `app` on `listener` until `shutdown` is cancelled.
///
/// `requests` is the parent token of every per-request token; it is
/// cancelled once the grace period after shutdown has elapsed.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    requests: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    log::info!("[server] Listening on http://{}", addr);

    let drain = shutdown.clone();
    let abort = requests.clone();
    tokio::spawn(async move {
        drain.cancelled().await;
        tokio::select! {
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                log::warn!("[server] Grace period elapsed, cancelling outstanding requests");
                abort.cancel();
            }
            _ = abort.cancelled() => {}
        }
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("[server] Shutting down");
        })
        .await;

    // Nothing is in flight any more; release the grace timer.
    requests.cancel();

    if let Err(e) = &result {
        log::error!("[server] Server error: {}", e);
    }
    log::info!("[server] Server stopped");

    result
}

/// Bind to `port` on all interfaces.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr).await
}

/// Cancel `shutdown` on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[server] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("[server] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("[server] Received Ctrl-C"),
        _ = terminate => log::info!("[server] Received SIGTERM"),
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;
    use crate::services::engine::ReviewerEngine;
    use crate::services::ledger::SqliteLedger;
    use crate::services::membership::SqliteDirectory;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let db = crate::db::initialize(&dir.path().join("test.db")).await.unwrap();

        let engine = ReviewerEngine::with_seed(
            Arc::new(SqliteLedger::new(db.clone())),
            Arc::new(SqliteDirectory::new(db.clone())),
            1,
        );
        let requests = CancellationToken::new();
        let app = build_app(AppState {
            db,
            engine: Arc::new(engine),
            cancel: requests.clone(),
            request_timeout: Duration::from_secs(5),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, app, shutdown.clone(), requests.clone()));

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(requests.is_cancelled());
    }

    #[tokio::test]
    async fn test_request_id_generated_and_echoed() {
        let app = with_middleware(Router::new().route("/ok", get(|| async { "ok" })));

        let response = app
            .clone()
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app
            .oneshot(
                Request::get("/ok")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        async fn boom() -> &'static str {
            panic!("boom")
        }
        let app = with_middleware(Router::new().route("/boom", get(boom)));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-request-id"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
