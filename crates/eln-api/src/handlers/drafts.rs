//! Draft endpoints (spec §6, §4.6): POST/GET/DELETE `/api/v1/drafts/...`

use std::collections::BTreeMap;

use axum::extract::{Path, Query};
use axum::Json;
use eln_domain::entities::DraftMetadata;
use eln_domain::errors::ElnError;
use eln_domain::ids::DraftId;
use eln_domain::permissions;
use eln_adapters::SaveDraftParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::handlers::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct SaveDraftRequest {
    pub sop_id: String,
    #[serde(default)]
    pub draft_id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completion_percentage: u8,
    #[serde(default)]
    pub form_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub filename_variables: Vec<String>,
    #[serde(default)]
    pub field_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct SaveDraftResponse {
    pub draft_id: String,
}

pub async fn save_draft(user: AuthenticatedUser, Json(body): Json<SaveDraftRequest>) -> ApiResult<Json<SaveDraftResponse>> {
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &body.sop_id).await?;

    let draft_id = match &body.draft_id {
        Some(id) => Some(DraftId::from_string(id.clone())?),
        None => None,
    };
    let permission_resource = match &draft_id {
        Some(id) => format!("draft:{}", id.as_str()),
        None => "draft:create".to_string(),
    };
    if !permissions::check(&user.user, &permission_resource) {
        return Err(ApiError::from(ElnError::forbidden("missing draft permission")));
    }

    let saved = user
        .tenant
        .draft_store
        .save(
            &user.user,
            &sop,
            SaveDraftParams {
                draft_id,
                session_id: body.session_id,
                title: body.title,
                completion_percentage: body.completion_percentage,
                form_data: body.form_data,
                filename_variables: body.filename_variables,
                field_ids: body.field_ids,
            },
        )
        .await?;

    Ok(Json(SaveDraftResponse {
        draft_id: saved.as_str().to_string(),
    }))
}

#[derive(Deserialize)]
pub struct SopScopeQuery {
    pub sop_id: String,
}

#[derive(Serialize)]
pub struct ListDraftsResponse {
    pub drafts: Vec<DraftMetadata>,
}

pub async fn list_drafts(user: AuthenticatedUser, Query(query): Query<SopScopeQuery>) -> ApiResult<Json<ListDraftsResponse>> {
    if !permissions::check(&user.user, "draft:list") {
        return Err(ApiError::from(ElnError::forbidden("missing draft permission")));
    }
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &query.sop_id).await?;
    let drafts = user.tenant.draft_store.list(&user.user, &sop).await?;
    Ok(Json(ListDraftsResponse { drafts }))
}

#[derive(Serialize)]
pub struct GetDraftResponse {
    pub draft_id: String,
    pub metadata: DraftMetadata,
    pub form_data: BTreeMap<String, Value>,
}

pub async fn get_draft(
    user: AuthenticatedUser,
    Path(draft_id): Path<String>,
    Query(query): Query<SopScopeQuery>,
) -> ApiResult<Json<GetDraftResponse>> {
    let draft_id = DraftId::from_string(draft_id)?;
    if !permissions::check(&user.user, &format!("draft:{}", draft_id.as_str())) {
        return Err(ApiError::from(ElnError::forbidden("missing draft permission")));
    }
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &query.sop_id).await?;
    let draft = user.tenant.draft_store.get(&user.user, &sop, &draft_id).await?;

    Ok(Json(GetDraftResponse {
        draft_id: draft.draft_id.as_str().to_string(),
        metadata: DraftMetadata::from(&draft),
        form_data: draft.form_data,
    }))
}

pub async fn delete_draft(
    user: AuthenticatedUser,
    Path(draft_id): Path<String>,
    Query(query): Query<SopScopeQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let draft_id = DraftId::from_string(draft_id)?;
    if !permissions::check(&user.user, &format!("draft:{}", draft_id.as_str())) {
        return Err(ApiError::from(ElnError::forbidden("missing draft permission")));
    }
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &query.sop_id).await?;
    user.tenant.draft_store.delete(&user.user, &sop, &draft_id).await?;
    Ok(Json(serde_json::json!({})))
}
