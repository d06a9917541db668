//! Tutor proxy server.
//!
//! Exposes the in-process [`TutorService`] over HTTP so clients can talk to
//! `/api/chat` without holding the backend credential themselves. Started
//! with the `serve` subcommand.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};

use super::protocol::{ChatRequest, ErrorBody, TutorResponse};
use super::service::TutorService;

/// Build the proxy router.
pub fn router(service: Arc<TutorService>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/healthz", get(healthz))
        .with_state(service)
}

/// Bind and run the proxy until the shutdown future resolves, then drain
/// open connections. The caller decides what shutdown means; the binary
/// hands in its Ctrl+C/SIGTERM watcher.
pub async fn serve(
    bind: SocketAddr,
    service: Arc<TutorService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("🌐 Tutor proxy listening on {}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down tutor proxy");
        })
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn chat(
    State(service): State<Arc<TutorService>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<TutorResponse>, ApiError> {
    let reply = service.build(&request).await?;
    Ok(Json(reply))
}

/// Handler-side error: any failure in the exchange maps to the wire error
/// shape with a non-2xx status.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Chat request failed: {}", self.0);
        let body = ErrorBody {
            error: "tutor backend unavailable".to_string(),
            details: Some(self.0.to_string()),
        };
        (StatusCode::BAD_GATEWAY, Json(body)).into_response()
    }
}
