//! Web App API server.
//!
//! Every route under `/api/v1` sits behind [`AuthLayer`]. Outer layers assign
//! a request id, trace requests and turn handler panics into `500`s.

pub mod error;
pub mod users;

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::AuthLayer;
use crate::storage::{ChatRepo, UserRepo};

use self::error::ApiError;

/// Repositories shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// User records.
    pub users: Arc<dyn UserRepo>,
    /// Chat-link records.
    pub chats: Arc<dyn ChatRepo>,
}

/// Build the full router. `secret` is the bot token used to verify requests.
pub fn router(state: AppState, secret: &str) -> Router {
    let api = Router::new()
        .route("/users/:user_id", get(users::get_user))
        .route("/user-info/upsert", post(users::upsert_user_info))
        .layer(AuthLayer::new(secret))
        .with_state(state);

    Router::new().nest("/api/v1", api).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = %crate::panic_message(payload.as_ref()), "panic recovered in request handler");
    ApiError::internal("").into_response()
}

/// Serve `app` on `addr` until `shutdown_rx` flips to `true` or closes.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "web server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            info!("web server shutting down");
        })
        .await?;

    info!("web server stopped");
    Ok(())
}
