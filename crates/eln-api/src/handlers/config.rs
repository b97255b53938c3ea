//! GET /api/config/runtime, GET /api/config/private (spec §6)
//!
//! `runtime` is unauthenticated and carries only what a client needs to log
//! in (identity-provider coordinates, CORS origins) — no size/retention
//! internals. `private` requires a valid token and returns the merged
//! config subset relevant to that caller's tenant.

use axum::Json;
use eln_adapters::{IdentityProviderConfig, SizePolicy};
use serde::Serialize;

use crate::auth::{AuthenticatedUser, TenantHandle};
use crate::handlers::ApiResult;

#[derive(Serialize)]
pub struct RuntimeConfigResponse {
    pub identity_provider: IdentityProviderConfig,
    pub cors_origins: Vec<String>,
}

pub async fn runtime_config(TenantHandle(tenant): TenantHandle) -> ApiResult<Json<RuntimeConfigResponse>> {
    Ok(Json(RuntimeConfigResponse {
        identity_provider: tenant.config.identity_provider.clone(),
        cors_origins: tenant.config.cors_origins.clone(),
    }))
}

#[derive(Serialize)]
pub struct PrivateConfigResponse {
    pub forms_location: String,
    pub draft_location: String,
    pub submission_location: String,
    pub size_policy: SizePolicy,
    pub retention_days: u32,
    pub cors_origins: Vec<String>,
}

pub async fn private_config(user: AuthenticatedUser) -> ApiResult<Json<PrivateConfigResponse>> {
    let config = &user.tenant.config;
    Ok(Json(PrivateConfigResponse {
        forms_location: config.forms_location.clone(),
        draft_location: config.draft_location.clone(),
        submission_location: config.submission_location.clone(),
        size_policy: config.size_policy.clone(),
        retention_days: config.retention_days,
        cors_origins: config.cors_origins.clone(),
    }))
}
