//! Submission Engine (C8)
//!
//! Atomically promotes form data and staged files into an immutable,
//! content-addressed submission (spec §4.8). The 8-step protocol:
//! permission check, freeze identifiers, extract filename variables,
//! compose paths, commit the body, move attachments, report partial
//! failure without rolling back, leave the source draft for the caller
//! to clean up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eln_domain::entities::{Provenance, SopDescriptor, StagedFile, Submission, User};
use eln_domain::errors::ElnError;
use eln_domain::filename_codec;
use eln_domain::ids::{DraftId, ElnUuid, Tenant};
use eln_domain::permissions;
use eln_ports::{Clock, StorageAdapter};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::attachment_retry::{AttachmentRetryQueue, PendingMove};

pub struct SubmissionEngine<S: StorageAdapter, C: Clock> {
    storage: Arc<S>,
    clock: Arc<C>,
    retry_queue: Arc<AttachmentRetryQueue>,
    tenant: Tenant,
    draft_root: String,
    submission_root: String,
    attachment_move_grace_period: Duration,
}

pub struct SubmitRequest {
    pub form_data: BTreeMap<String, Value>,
    pub attachments: Vec<StagedFile>,
    pub source_draft_id: Option<DraftId>,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub eln_uuid: ElnUuid,
    pub filename: String,
    /// Non-empty iff one or more attachment moves didn't converge before
    /// the grace period elapsed. The submission itself is already
    /// committed either way (spec §4.8 step 7).
    pub pending_attachments: Vec<String>,
}

impl<S: StorageAdapter + 'static, C: Clock + 'static> SubmissionEngine<S, C> {
    pub fn new(
        storage: Arc<S>,
        clock: Arc<C>,
        retry_queue: Arc<AttachmentRetryQueue>,
        tenant: Tenant,
        draft_root: impl Into<String>,
        submission_root: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            retry_queue,
            tenant,
            draft_root: draft_root.into(),
            submission_root: submission_root.into(),
            attachment_move_grace_period: Duration::from_secs(10),
        }
    }

    pub async fn submit(&self, user: &User, sop: &SopDescriptor, request: SubmitRequest) -> Result<SubmitOutcome, ElnError> {
        let required_permission = format!("submit:{}", sop.sop_id);
        if !permissions::check(user, &required_permission) {
            return Err(ElnError::forbidden(format!("missing permission {required_permission}")));
        }

        // Step 2: freeze identifiers for the whole operation.
        let eln_uuid = ElnUuid::new();
        let timestamp = self.clock.now();

        // Step 3: extract filename variables positionally; missing values
        // become empty strings at their position.
        let string_form_data = stringify_form_data(&request.form_data);
        let filename_variables = sop.extract_filename_variables(&string_form_data);

        // Step 4: compose the submission filename and path.
        let filename = filename_codec::encode_submission(&filename_variables, &user.id, timestamp, eln_uuid.as_str());
        for variable in &filename_variables {
            filename_codec::assert_delimiter_free(variable)?;
        }
        let submission_path = format!("{}/{}/{}", self.submission_root, sop.sop_id, filename);

        let content_hash = compute_content_hash(&request.form_data);
        let submission = Submission {
            eln_uuid: eln_uuid.clone(),
            tenant: self.tenant.clone(),
            sop_id: sop.sop_id.clone(),
            sop_version: sop.version.clone(),
            filename: filename.clone(),
            submitted_at: timestamp,
            submitter_id: user.id.clone(),
            form_data: request.form_data,
            field_definitions_snapshot: sop.fields.clone(),
            sop_metadata_snapshot: serde_json::json!({ "sop_id": sop.sop_id, "version": sop.version }),
            attachments: request.attachments.clone(),
            provenance: Provenance {
                source_draft_id: request.source_draft_id,
                session_id: request.session_id,
                submission_time: timestamp,
                actor: user.id.clone(),
            },
            content_hash,
        };

        // Step 5: conditional create. A Conflict here aborts the whole
        // operation — the body was never written, so there's nothing to
        // roll back.
        let body = serde_json::to_vec(&submission).map_err(|e| ElnError::invalid(e.to_string()))?;
        self.storage.put_bytes(&submission_path, body.into(), "application/json", true).await?;

        // From here the submission is committed (spec §4.8 ordering
        // guarantee): immutability forbids any further `put` or `delete`
        // on this path, whatever happens to the attachment moves below.
        let pending = self.move_attachments(&sop.sop_id, &user.id, &request.attachments, &eln_uuid).await;

        Ok(SubmitOutcome {
            eln_uuid,
            filename,
            pending_attachments: pending,
        })
    }

    /// Moves each attachment in a detached task so a client disconnect
    /// can't abort an in-flight move (spec §5), then waits up to a bounded
    /// grace period before reporting back. Anything still unconverged at
    /// that point is hnaded to the background retry worker.
    async fn move_attachments(
        &self,
        sop_id: &str,
        owner_id: &str,
        attachments: &[StagedFile],
        eln_uuid: &ElnUuid,
    ) -> Vec<String> {
        let storage = self.storage.clone();
        let draft_root = self.draft_root.clone();
        let submission_root = self.submission_root.clone();
        let sop_id_owned = sop_id.to_string();
        let owner_id_owned = owner_id.to_string();
        let attachments_owned = attachments.to_vec();

        let handle = tokio::spawn(async move {
            let mut results = Vec::with_capacity(attachments_owned.len());
            for attachment in attachments_owned {
                let stored_filename = filename_codec::encode_staged_file(
                    &owner_id_owned,
                    &attachment.field_id,
                    attachment.temp_id.as_str(),
                    &attachment.original_name,
                );
                let src = format!("{draft_root}/{sop_id_owned}/attachments/{stored_filename}");
                let dst = format!("{submission_root}/{sop_id_owned}/attachments/{stored_filename}");
                let outcome = storage.move_object(&src, &dst).await;
                results.push((attachment, outcome));
            }
            results
        });

        match tokio::time::timeout(self.attachment_move_grace_period, handle).await {
            Ok(Ok(results)) => {
                let mut pending = Vec::new();
                for (attachment, outcome) in results {
                    if let Err(e) = outcome {
                        tracing::warn!(
                            error = %e,
                            eln_uuid = %eln_uuid,
                            temp_id = %attachment.temp_id,
                            "attachment move failed after submission commit; re-queued for retry"
                        );
                        pending.push(attachment.original_name.clone());
                        self.retry_queue.enqueue(PendingMove {
                            sop_id: sop_id.to_string(),
                            owner_id: owner_id.to_string(),
                            attachment,
                            attempts: 0,
                        });
                    }
                }
                pending
            }
            Ok(Err(_join_error)) => {
                tracing::error!(eln_uuid = %eln_uuid, "attachment move task panicked");
                attachments.iter().map(|a| a.original_name.clone()).collect()
            }
            Err(_timeout) => {
                tracing::warn!(
                    eln_uuid = %eln_uuid,
                    "attachment moves exceeded grace period; continuing in the background"
                );
                attachments.iter().map(|a| a.original_name.clone()).collect()
            }
        }
    }

    /// Explicit retry entry point for `POST /api/v1/files/attach-to-eln`
    /// (spec §6, §8 scenario 5): re-attempts each move and returns the
    /// ones that converged. Idempotent — a move whose destination already
    /// exists with matching bytes is treated as success (spec §4.4).
    pub async fn attach_to_eln(
        &self,
        sop_id: &str,
        owner_id: &str,
        attachments: &[StagedFile],
    ) -> Result<Vec<String>, ElnError> {
        let mut attached = Vec::new();
        for attachment in attachments {
            let stored_filename = filename_codec::encode_staged_file(
                owner_id,
                &attachment.field_id,
                attachment.temp_id.as_str(),
                &attachment.original_name,
            );
            let src = format!("{}/{}/attachments/{}", self.draft_root, sop_id, stored_filename);
            let dst = format!("{}/{}/attachments/{}", self.submission_root, sop_id, stored_filename);
            self.storage.move_object(&src, &dst).await?;
            attached.push(attachment.original_name.clone());
        }
        Ok(attached)
    }
}

fn stringify_form_data(form_data: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    form_data
        .iter()
        .map(|(k, v)| {
            let as_string = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), as_string)
        })
        .collect()
}

/// Content hash over form-data only (open question resolved in DESIGN.md):
/// attachments converge asynchronously after commit, so hashing them in
/// would make the hash unstable relative to the immutable body.
fn compute_content_hash(form_data: &BTreeMap<String, Value>) -> String {
    let canonical = serde_json::to_vec(form_data).expect("BTreeMap keys serialize deterministically");
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_storage::FsStorageAdapter;
    use eln_domain::entities::SopField;
    use eln_domain::ids::TempId;
    use eln_ports::SystemClock;

    fn sop() -> SopDescriptor {
        SopDescriptor {
            sop_id: "SOP42".into(),
            version: "1".into(),
            fields: vec![SopField::Field {
                id: "project_id".into(),
                field_type: "text".into(),
                required: true,
                validation: None,
            }],
            filename_component_order: vec!["project_id".into(), "sample_id".into()],
        }
    }

    fn user() -> User {
        User {
            id: "alice_acme_org".into(),
            email: "alice@acme.org".into(),
            groups: vec![],
            permissions: vec!["submit:SOP*".into()],
            is_admin: false,
        }
    }

    fn engine() -> (SubmissionEngine<FsStorageAdapter, SystemClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorageAdapter::new(dir.path()));
        let clock = Arc::new(SystemClock);
        let queue = Arc::new(AttachmentRetryQueue::new());
        (
            SubmissionEngine::new(storage, clock, queue, Tenant::parse("acme").unwrap(), "drafts", "submissions"),
            dir,
        )
    }

    #[tokio::test]
    async fn submit_without_permission_is_forbidden() {
        let (engine, _dir) = engine();
        let mut unauthorized = user();
        unauthorized.permissions = vec![];
        let sop = sop();

        let mut form_data = BTreeMap::new();
        form_data.insert("project_id".to_string(), Value::String("P7".into()));

        let err = engine
            .submit(
                &unauthorized,
                &sop,
                SubmitRequest {
                    form_data,
                    attachments: vec![],
                    source_draft_id: None,
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ElnError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn submit_commits_body_with_no_attachments() {
        let (engine, _dir) = engine();
        let user = user();
        let sop = sop();

        let mut form_data = BTreeMap::new();
        form_data.insert("project_id".to_string(), Value::String("P7".into()));
        form_data.insert("sample_id".to_string(), Value::String("S9".into()));

        let outcome = engine
            .submit(
                &user,
                &sop,
                SubmitRequest {
                    form_data,
                    attachments: vec![],
                    source_draft_id: None,
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap();

        assert!(outcome.pending_attachments.is_empty());
        assert!(outcome.filename.contains("-P7-S9-"));
        assert!(outcome.filename.ends_with(&format!("{}.json", outcome.eln_uuid.as_str())));
    }

    #[tokio::test]
    async fn second_submit_with_same_inputs_gets_a_fresh_eln_uuid() {
        let (engine, _dir) = engine();
        let user = user();
        let sop = sop();

        let mut form_data = BTreeMap::new();
        form_data.insert("project_id".to_string(), Value::String("P7".into()));

        let first = engine
            .submit(
                &user,
                &sop,
                SubmitRequest {
                    form_data: form_data.clone(),
                    attachments: vec![],
                    source_draft_id: None,
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap();
        let second = engine
            .submit(
                &user,
                &sop,
                SubmitRequest {
                    form_data,
                    attachments: vec![],
                    source_draft_id: None,
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap();

        assert_ne!(first.eln_uuid.as_str(), second.eln_uuid.as_str());
        assert_ne!(first.filename, second.filename);
    }

    #[tokio::test]
    async fn submit_moves_staged_attachments_into_submission_namespace() {
        let (engine, _dir) = engine();
        let user = user();
        let sop = sop();

        let staged_filename = filename_codec::encode_staged_file("alice_acme_org", "photo", "abcd1234", "photo.png");
        let src = format!("drafts/SOP42/attachments/{staged_filename}");
        engine
            .storage
            .put_bytes(&src, bytes::Bytes::from_static(b"img"), "image/png", false)
            .await
            .unwrap();

        let attachment = StagedFile {
            temp_id: TempId::from_string("abcd1234").unwrap(),
            draft_id: DraftId::new(),
            field_id: "photo".into(),
            original_name: "photo.png".into(),
            mime_type: "image/png".into(),
            size_bytes: 3,
            uploaded_at: chrono::Utc::now(),
        };

        let mut form_data = BTreeMap::new();
        form_data.insert("project_id".to_string(), Value::String("P7".into()));

        let outcome = engine
            .submit(
                &user,
                &sop,
                SubmitRequest {
                    form_data,
                    attachments: vec![attachment],
                    source_draft_id: None,
                    session_id: "s1".into(),
                },
            )
            .await
            .unwrap();

        assert!(outcome.pending_attachments.is_empty());
        let dst = format!("submissions/SOP42/attachments/{staged_filename}");
        assert_eq!(engine.storage.get(&dst).await.unwrap(), bytes::Bytes::from_static(b"img"));
    }
}
