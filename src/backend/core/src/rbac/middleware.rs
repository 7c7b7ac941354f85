//! Axum authorization middleware backed by the [`Enforcer`].
//!
//! An upstream authentication layer inserts a [`Principal`] into the request
//! extensions. This layer maps the HTTP method to an [`Action`], normalizes
//! the path to its base resource and asks the enforcer. A denial, a missing
//! principal or an unmapped method all produce a JSON 403; the enforcer is
//! never a source of 500s.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::enforcer::{Decision, Enforcer};
use super::models::{normalize_resource_path, Action, RoleName, UserId};
use crate::error::{ErrorCode, ErrorResponse};

// ═══════════════════════════════════════════════════════════════════════════════
// Request context
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated caller, inserted by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
}

impl Principal {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// What the middleware allowed. Inserted into request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub user_id: UserId,
    pub resource: String,
    pub action: Action,
    pub via_role: RoleName,
}

/// Axum extractor for `AuthorizedRequest`.
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthorizedRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthorizedRequest>()
            .cloned()
            .ok_or_else(|| {
                let body = ErrorResponse::new(
                    ErrorCode::ConfigurationError,
                    "Authorization context not available. Ensure AuthorizeLayer is applied.",
                );
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that checks every request against the enforcer.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/users/:id", get(show_user))
///     .layer(AuthorizeLayer::new(enforcer.clone()))
///     .layer(authenticate);
/// ```
#[derive(Clone)]
pub struct AuthorizeLayer {
    enforcer: Arc<Enforcer>,
}

impl AuthorizeLayer {
    pub fn new(enforcer: Arc<Enforcer>) -> Self {
        Self { enforcer }
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            enforcer: self.enforcer.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct AuthorizeService<S> {
    inner: S,
    enforcer: Arc<Enforcer>,
}

impl<S> Service<Request<Body>> for AuthorizeService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let enforcer = self.enforcer.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(principal) = request.extensions().get::<Principal>().cloned() else {
                return Ok(forbidden_response("Authentication required for this resource"));
            };

            let Some(action) = Action::from_method(request.method().as_str()) else {
                warn!(
                    user_id = %principal.user_id,
                    method = %request.method(),
                    "Method has no action mapping"
                );
                return Ok(forbidden_response(&format!(
                    "Method {} is not permitted",
                    request.method()
                )));
            };

            let resource = normalize_resource_path(request.uri().path());

            match enforcer.decide(principal.user_id.as_str(), &resource, action) {
                Decision::Allow { via_role } => {
                    request.extensions_mut().insert(AuthorizedRequest {
                        user_id: principal.user_id,
                        resource,
                        action,
                        via_role,
                    });
                    inner.call(request).await
                }
                Decision::Deny(reason) => {
                    warn!(
                        user_id = %principal.user_id,
                        resource = %resource,
                        action = %action,
                        reason = %reason,
                        "Permission denied"
                    );
                    Ok(forbidden_response(&format!(
                        "You do not have permission to {} {}",
                        action, resource
                    )))
                }
            }
        })
    }
}

/// Build a 403 Forbidden JSON response.
fn forbidden_response(message: &str) -> Response {
    let body = ErrorResponse::new(ErrorCode::Forbidden, message);
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}
