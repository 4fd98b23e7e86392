//! Tower layer that authenticates every request before it reaches a handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::{verify, AuthError, Principal, INIT_DATA_HEADER};
use crate::http::error::ApiError;

/// Authentication layer.
///
/// Holds the signing secret (the bot token), which never changes while the
/// process runs.
#[derive(Clone)]
pub struct AuthLayer {
    secret: Arc<str>,
}

impl AuthLayer {
    /// Create a layer verifying payloads signed for `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::from(secret),
        }
    }
}

impl std::fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            secret: Arc::clone(&self.secret),
        }
    }
}

/// Authentication service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    secret: Arc<str>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Swap in a fresh clone so the instance that was polled ready serves
        // this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let secret = Arc::clone(&self.secret);

        Box::pin(async move {
            match authenticate(&req, &secret) {
                Ok(principal) => {
                    debug!(tg_user_id = principal.tg_user_id, "request authenticated");
                    req.extensions_mut().insert(principal);
                    inner.call(req).await
                }
                Err(e) => {
                    warn!(error = %e, path = %req.uri().path(), "request rejected");
                    Ok(ApiError::from(e).into_response())
                }
            }
        })
    }
}

fn authenticate(req: &Request<Body>, secret: &str) -> Result<Principal, AuthError> {
    let init_data = req
        .headers()
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader)?;

    let tg_user_id = verify(init_data, secret)?;
    Ok(Principal { tg_user_id })
}
