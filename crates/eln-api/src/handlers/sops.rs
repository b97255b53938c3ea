//! GET /api/v1/sops/list, GET /api/v1/sops/{sop_id} (spec §6)

use axum::extract::Path;
use axum::Json;
use eln_domain::entities::SopDescriptor;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AuthenticatedUser;
use crate::handlers::ApiResult;

#[derive(Serialize)]
pub struct SopsListResponse {
    pub sops: Vec<Arc<SopDescriptor>>,
    pub total: usize,
}

pub async fn list_sops(user: AuthenticatedUser) -> ApiResult<Json<SopsListResponse>> {
    let sops = user.tenant.sop_registry.list(&user.tenant.tenant).await?;
    Ok(Json(SopsListResponse {
        total: sops.len(),
        sops,
    }))
}

#[derive(Serialize)]
pub struct SopResponse {
    pub sop: Arc<SopDescriptor>,
}

pub async fn get_sop(user: AuthenticatedUser, Path(sop_id): Path<String>) -> ApiResult<Json<SopResponse>> {
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &sop_id).await?;
    Ok(Json(SopResponse { sop }))
}
