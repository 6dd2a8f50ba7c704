//! Axum/tower guard that runs the access decision engine per request.
//!
//! The upstream authentication collaborator inserts the resolved [`Actor`]
//! and, for organization-scoped routes, an [`OrganizationScope`] into the
//! request extensions. This layer evaluates them and either rejects with 403
//! or forwards the request with an [`AccessContext`] attached.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::models::{Actor, OrganizationScope};
use super::policy::{AccessDecision, AccessRequest, Decision};
use super::roles::{Permission, Role};

// ═══════════════════════════════════════════════════════════════════════════════
// Access Context (extracted in handlers)
// ═══════════════════════════════════════════════════════════════════════════════

/// The actor and scope that passed the guard.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub actor: Actor,
    pub scope: OrganizationScope,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AccessContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessContext>()
            .cloned()
            .ok_or_else(|| {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MISSING_ACCESS_CONTEXT",
                    "Access context not available. Ensure the access layer is applied.",
                    None,
                )
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer declaring the roles and permissions a route requires.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/orgs/:id/tasks", post(create_task))
///     .layer(RequireAccessLayer::new(engine.clone())
///         .roles([Role::Admin])
///         .permissions([Permission::Write]));
/// ```
#[derive(Clone)]
pub struct RequireAccessLayer {
    engine: Arc<AccessDecision>,
    required_roles: Option<BTreeSet<Role>>,
    required_permissions: BTreeSet<Permission>,
}

impl RequireAccessLayer {
    pub fn new(engine: Arc<AccessDecision>) -> Self {
        Self {
            engine,
            required_roles: None,
            required_permissions: BTreeSet::new(),
        }
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles
            .get_or_insert_with(BTreeSet::new)
            .extend(roles);
        self
    }

    pub fn permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.required_permissions.extend(permissions);
        self
    }
}

impl<S> Layer<S> for RequireAccessLayer {
    type Service = RequireAccessService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAccessService {
            inner,
            engine: self.engine.clone(),
            required_roles: self.required_roles.clone(),
            required_permissions: self.required_permissions.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Service that evaluates access before calling the inner service.
#[derive(Clone)]
pub struct RequireAccessService<S> {
    inner: S,
    engine: Arc<AccessDecision>,
    required_roles: Option<BTreeSet<Role>>,
    required_permissions: BTreeSet<Permission>,
}

impl<S> Service<Request<Body>> for RequireAccessService<S>
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
        let engine = self.engine.clone();
        let required_roles = self.required_roles.clone();
        let required_permissions = self.required_permissions.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(actor) = request.extensions().get::<Actor>().cloned() else {
                return Ok(error_response(
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Authentication required for this resource",
                    None,
                ));
            };
            let scope = request
                .extensions()
                .get::<OrganizationScope>()
                .copied()
                .unwrap_or_default();

            let mut access = AccessRequest::new(actor.clone())
                .with_scope(scope)
                .require_permissions(required_permissions);
            if let Some(roles) = required_roles {
                access = access.require_roles(roles);
            }

            if let Decision::Deny(reason) = engine.evaluate(&access) {
                warn!(
                    actor_id = %actor.id,
                    scope = ?scope,
                    reason = reason.code(),
                    "Request rejected by access guard"
                );
                return Ok(error_response(
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "You do not have access to this resource",
                    Some(reason.code()),
                ));
            }

            request.extensions_mut().insert(AccessContext { actor, scope });
            inner.call(request).await
        })
    }
}

/// Build the JSON error body used by the guard.
fn error_response(status: StatusCode, code: &str, message: &str, reason: Option<&str>) -> Response {
    let body = serde_json::json!({
        "success": false,
        "error": {
            "code": code,
            "message": message,
            "reason": reason,
        }
    });
    (status, Json(body)).into_response()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
