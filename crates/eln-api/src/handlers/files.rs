//! POST /api/v1/files/upload, POST /api/v1/files/attach-to-eln (spec §6, §4.7)

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use axum::Json;
use bytes::Bytes;
use eln_adapters::UploadRequest;
use eln_domain::entities::StagedFile;
use eln_domain::errors::ElnError;
use eln_domain::ids::DraftId;
use eln_domain::permissions;
use eln_ports::ByteStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::handlers::{ApiError, ApiResult};

/// Wraps a multipart field's chunk stream, counting bytes against the
/// per-file and per-request caps as each chunk passes through (spec §4.4,
/// §5). Nothing is buffered ahead of the count: once either cap is crossed
/// the stream simply ends, and the caller turns that truncation into a
/// proper `TooLarge` error by re-checking the observed totals against
/// `SizePolicy` once the write settles.
struct SizeLimitedStream<'a> {
    inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>,
    file_bytes: Arc<AtomicU64>,
    request_bytes: Arc<AtomicU64>,
    max_file_bytes: u64,
    max_request_bytes: u64,
}

impl<'a> Stream for SizeLimitedStream<'a> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let len = chunk.len() as u64;
                let file_total = this.file_bytes.fetch_add(len, Ordering::SeqCst) + len;
                let request_total = this.request_bytes.fetch_add(len, Ordering::SeqCst) + len;
                if file_total > this.max_file_bytes || request_total > this.max_request_bytes {
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

fn size_limited_field_stream<'a>(
    field: Field<'a>,
    file_bytes: Arc<AtomicU64>,
    request_bytes: Arc<AtomicU64>,
    max_file_bytes: u64,
    max_request_bytes: u64,
) -> ByteStream<'a> {
    let mapped = field.map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string())));
    let inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>> = Box::pin(mapped);
    Box::pin(SizeLimitedStream {
        inner,
        file_bytes,
        request_bytes,
        max_file_bytes,
        max_request_bytes,
    })
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_ids: Vec<String>,
    pub uploaded_urls: Vec<String>,
}

/// Multipart fields expected, in order: `sop_id`, `draft_id`, then one or
/// more `field_id`/`file` pairs, each `field_id` text part immediately
/// preceding the `file` part it names. Files stream straight into the File
/// Stager as their chunks arrive off the wire — a `field_id` part must come
/// first because the destination path needs it before the first byte is
/// written. A single-attachment request is just the N=1 case.
pub async fn upload_file(user: AuthenticatedUser, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let size_policy = &user.tenant.config.size_policy;
    let request_bytes = Arc::new(AtomicU64::new(0));

    let mut sop_id: Option<String> = None;
    let mut draft_id: Option<String> = None;
    let mut pending_field_id: Option<String> = None;
    let mut file_ids = Vec::new();
    let mut uploaded_urls = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from(ElnError::invalid(e.to_string())))?
    {
        match field.name().unwrap_or_default() {
            "sop_id" => sop_id = Some(field.text().await.map_err(|e| ApiError::from(ElnError::invalid(e.to_string())))?),
            "draft_id" => draft_id = Some(field.text().await.map_err(|e| ApiError::from(ElnError::invalid(e.to_string())))?),
            "field_id" => {
                pending_field_id = Some(field.text().await.map_err(|e| ApiError::from(ElnError::invalid(e.to_string())))?)
            }
            "file" => {
                let sop_id = sop_id
                    .as_deref()
                    .ok_or_else(|| ApiError::from(ElnError::invalid("sop_id must precede file parts")))?;
                let draft_id = draft_id
                    .as_deref()
                    .ok_or_else(|| ApiError::from(ElnError::invalid("draft_id must precede file parts")))?;
                let field_id = pending_field_id
                    .take()
                    .ok_or_else(|| ApiError::from(ElnError::invalid("each file part must be preceded by a field_id part")))?;
                let draft_id = DraftId::from_string(draft_id.to_string())?;

                let original_name = field.file_name().unwrap_or("upload.bin").to_string();
                let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();

                let file_bytes = Arc::new(AtomicU64::new(0));
                let stream = size_limited_field_stream(
                    field,
                    file_bytes.clone(),
                    request_bytes.clone(),
                    size_policy.max_file_bytes,
                    size_policy.max_request_bytes,
                );

                let result = user
                    .tenant
                    .file_stager
                    .upload(
                        UploadRequest {
                            sop_id,
                            draft_id: &draft_id,
                            owner_id: &user.user.id,
                            field_id: &field_id,
                            original_name: &original_name,
                            mime_type: &mime_type,
                            size_hint: 0,
                        },
                        size_policy,
                        stream,
                    )
                    .await;

                // The stream above truncates silently once a cap is hit, so
                // the authoritative check happens here against what was
                // actually written, not what the client claimed up front.
                let observed_file_bytes = file_bytes.load(Ordering::SeqCst);
                let observed_request_bytes = request_bytes.load(Ordering::SeqCst);
                if let Err(e) = size_policy
                    .check_size(observed_file_bytes)
                    .and_then(|_| size_policy.check_request_size(observed_request_bytes))
                {
                    if let Ok(staged) = &result {
                        let _ = user.tenant.file_stager.delete(sop_id, &staged.stored_filename).await;
                    }
                    return Err(ApiError::from(e));
                }

                let staged = result?;
                file_ids.push(staged.temp_id.as_str().to_string());
                uploaded_urls.push(staged.path);
            }
            _ => continue,
        }
    }

    if file_ids.is_empty() {
        return Err(ApiError::from(ElnError::invalid("no file parts in upload")));
    }

    Ok(Json(UploadResponse { file_ids, uploaded_urls }))
}

#[derive(Deserialize)]
pub struct AttachToElnRequest {
    pub sop_id: String,
    pub owner_id: String,
    pub attachments: Vec<StagedFile>,
}

#[derive(Serialize)]
pub struct AttachToElnResponse {
    pub attached: Vec<String>,
}

pub async fn attach_to_eln(user: AuthenticatedUser, Json(body): Json<AttachToElnRequest>) -> ApiResult<Json<AttachToElnResponse>> {
    if !permissions::check(&user.user, &format!("submit:{}", body.sop_id)) {
        return Err(ApiError::from(ElnError::forbidden("missing submit permission")));
    }
    if body.owner_id != user.user.id && !user.user.is_admin {
        return Err(ApiError::from(ElnError::forbidden("owner_id must match the authenticated caller")));
    }

    let attached = user
        .tenant
        .submission_engine
        .attach_to_eln(&body.sop_id, &body.owner_id, &body.attachments)
        .await?;
    Ok(Json(AttachToElnResponse { attached }))
}
