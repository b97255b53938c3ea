//! POST /api/v1/elns/submit (spec §6, §4.8)
//!
//! The permission check (`submit:{sop_id}`) lives inside
//! `SubmissionEngine::submit` itself, so the handler just propagates
//! whatever `ElnError` comes back. A non-empty `pending_attachments` is
//! reported as an advisory in an otherwise-200 response (spec §7's
//! `PartialFailure` semantics), not as an error.

use std::collections::BTreeMap;

use axum::Json;
use eln_adapters::SubmitRequest;
use eln_domain::entities::StagedFile;
use eln_domain::ids::DraftId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::handlers::ApiResult;

#[derive(Deserialize)]
pub struct SubmitElnRequest {
    pub sop_id: String,
    pub session_id: String,
    #[serde(default)]
    pub form_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub attachments: Vec<StagedFile>,
    #[serde(default)]
    pub source_draft_id: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitElnResponse {
    pub eln_uuid: String,
    pub filename: String,
    pub pending_attachments: Vec<String>,
}

pub async fn submit_eln(user: AuthenticatedUser, Json(body): Json<SubmitElnRequest>) -> ApiResult<Json<SubmitElnResponse>> {
    let sop = user.tenant.sop_registry.get(&user.tenant.tenant, &body.sop_id).await?;

    let source_draft_id = match body.source_draft_id {
        Some(id) => Some(DraftId::from_string(id)?),
        None => None,
    };

    let outcome = user
        .tenant
        .submission_engine
        .submit(
            &user.user,
            &sop,
            SubmitRequest {
                form_data: body.form_data,
                attachments: body.attachments,
                source_draft_id,
                session_id: body.session_id,
            },
        )
        .await?;

    Ok(Json(SubmitElnResponse {
        eln_uuid: outcome.eln_uuid.as_str().to_string(),
        filename: outcome.filename,
        pending_attachments: outcome.pending_attachments,
    }))
}
