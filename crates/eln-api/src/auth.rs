//! Bearer-token authentication and tenant resolution (spec §6)
//!
//! Each request is resolved to a tenant (from `X-Tenant-Id`, falling back to
//! the first label of the `Host` header) before the bearer token is checked
//! against that tenant's identity provider. Two axum extractors do the work:
//! `TenantHandle` alone for endpoints like `/api/config/runtime` that don't
//! require auth, and `AuthenticatedUser` for everything that does.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use eln_domain::{errors::ElnError, ids::Tenant, User};
use eln_ports::IdentityProvider;

use crate::state::{AppState, TenantContext};
use std::sync::Arc;

#[derive(Debug)]
pub struct AuthError(pub ElnError);

impl From<ElnError> for AuthError {
    fn from(e: ElnError) -> Self {
        AuthError(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ElnError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            ElnError::Forbidden { .. } => (StatusCode::FORBIDDEN, self.0.to_string()),
            ElnError::Invalid { .. } => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            ElnError::ProviderUnreachable { .. } => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        let body = Json(serde_json::json!({ "error": message, "code": status.as_u16() }));
        (status, body).into_response()
    }
}

/// The resolved tenant and its component bundle, extractable on its own for
/// endpoints that need tenant scoping but not an authenticated user.
pub struct TenantHandle(pub Arc<TenantContext>);

fn tenant_id_from_parts(parts: &Parts) -> Result<Tenant, AuthError> {
    if let Some(header) = parts.headers.get("x-tenant-id") {
        let raw = header.to_str().map_err(|_| AuthError(ElnError::invalid("malformed X-Tenant-Id header")))?;
        return Tenant::parse(raw).map_err(AuthError);
    }

    let host = parts
        .headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AuthError(ElnError::invalid("no tenant could be resolved from this request")))?;
    let label = host.split('.').next().unwrap_or(host).split(':').next().unwrap_or(host);
    Tenant::parse(label).map_err(AuthError)
}

impl<S> FromRequestParts<S> for TenantHandle
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let tenant = tenant_id_from_parts(parts)?;
        let context = app_state.tenant(&tenant).await?;
        Ok(TenantHandle(context))
    }
}

/// A validated caller for a resolved tenant (spec §4.2/§4.3): the bearer
/// token is checked against that tenant's identity provider, never a
/// process-global one, since two tenants may use different providers.
pub struct AuthenticatedUser {
    pub user: User,
    pub tenant: Arc<TenantContext>,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TenantHandle(tenant) = TenantHandle::from_request_parts(parts, state).await?;

        let header = parts.headers.get(AUTHORIZATION).ok_or(AuthError(ElnError::Unauthenticated))?;
        let raw = header.to_str().map_err(|_| AuthError(ElnError::Unauthenticated))?;
        let token = raw.strip_prefix("Bearer ").ok_or(AuthError(ElnError::Unauthenticated))?;

        let user = tenant.identity_provider.validate(token).await?;
        Ok(AuthenticatedUser { user, tenant })
    }
}
