//! Draft Store (C6)
//!
//! CRUD on mutable drafts keyed by `(tenant, sop, draft_id)`, scoped by
//! authenticated user (admin may scope by tenant). Filenames embed
//! `owner_id` so listing-by-owner never needs to read a body it's about
//! to discard (spec §4.6).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eln_domain::entities::{Draft, DraftMetadata, SopDescriptor, User};
use eln_domain::errors::ElnError;
use eln_domain::filename_codec::{self, DecodedDraft};
use eln_domain::ids::{DraftId, Tenant};
use eln_ports::{Clock, StorageAdapter};
use serde_json::Value;

pub struct DraftStore<S: StorageAdapter, C: Clock> {
    storage: Arc<S>,
    clock: Arc<C>,
    tenant: Tenant,
    draft_root: String,
    /// TTL past which `list` prunes a draft on access (spec §3, §9: trigger
    /// resolved as an on-access sweep rather than a separate cron job).
    retention: Duration,
}

pub struct SaveDraftParams {
    pub draft_id: Option<DraftId>,
    pub session_id: String,
    pub title: String,
    pub completion_percentage: u8,
    pub form_data: BTreeMap<String, Value>,
    pub filename_variables: Vec<String>,
    pub field_ids: Vec<String>,
}

impl<S: StorageAdapter, C: Clock> DraftStore<S, C> {
    pub fn new(storage: Arc<S>, clock: Arc<C>, tenant: Tenant, draft_root: impl Into<String>) -> Self {
        Self::with_retention(storage, clock, tenant, draft_root, Duration::from_secs(30 * 24 * 60 * 60))
    }

    pub fn with_retention(
        storage: Arc<S>,
        clock: Arc<C>,
        tenant: Tenant,
        draft_root: impl Into<String>,
        retention: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            tenant,
            draft_root: draft_root.into(),
            retention,
        }
    }

    fn sop_prefix(&self, sop_id: &str) -> String {
        format!("{}/{}/", self.draft_root, sop_id)
    }

    fn key_for(&self, sop_id: &str, filename: &str) -> String {
        format!("{}/{}/{}", self.draft_root, sop_id, filename)
    }

    /// Scan `{draft_root}/{sop_id}/` and decode each filename until one
    /// matches `draft_id`. Cheap relative to a body read: it never
    /// fetches an object it isn't returning.
    async fn find_existing(
        &self,
        sop: &SopDescriptor,
        draft_id: &DraftId,
    ) -> Result<Option<(String, DecodedDraft)>, ElnError> {
        let keys = self.storage.list(&self.sop_prefix(&sop.sop_id)).await?;
        for key in keys {
            let Some(filename) = key.rsplit('/').next() else { continue };
            if !filename.starts_with("draft_") {
                continue;
            }
            let Ok(decoded) = filename_codec::decode_draft(filename, sop.filename_component_count()) else {
                continue;
            };
            if decoded.draft_id == draft_id.as_str() {
                return Ok(Some((key, decoded)));
            }
        }
        Ok(None)
    }

    pub async fn save(
        &self,
        user: &User,
        sop: &SopDescriptor,
        params: SaveDraftParams,
    ) -> Result<DraftId, ElnError> {
        if params.filename_variables.len() != params.field_ids.len() {
            return Err(ElnError::invalid(
                "filename_variables and field_ids must be the same length",
            ));
        }

        let (draft_id, existing) = match params.draft_id {
            Some(id) => {
                let existing = self.find_existing(sop, &id).await?;
                if let Some((_, decoded)) = &existing {
                    if decoded.owner_id != user.id && !user.is_admin {
                        return Err(ElnError::forbidden("draft is owned by another user"));
                    }
                }
                (id, existing)
            }
            None => (DraftId::new(), None),
        };

        let now = self.clock.now();
        let (created_at, staged_files) = match &existing {
            Some((old_key, _)) => {
                let body = self.storage.get(old_key).await?;
                let previous: Draft = serde_json::from_slice(&body)
                    .map_err(|e| ElnError::invalid(format!("corrupt draft body: {e}")))?;
                (previous.created_at, previous.staged_files)
            }
            None => (now, Vec::new()),
        };

        let draft = Draft {
            draft_id: draft_id.clone(),
            tenant: self.tenant.clone(),
            sop_id: sop.sop_id.clone(),
            session_id: params.session_id,
            owner_id: user.id.clone(),
            created_at,
            updated_at: now,
            completion_percentage: params.completion_percentage,
            title: params.title,
            form_data: params.form_data,
            filename_variables: params.filename_variables.clone(),
            field_ids: params.field_ids,
            staged_files,
            size_bytes: 0,
        };

        let new_filename =
            filename_codec::encode_draft(&draft.filename_variables, &user.id, now, draft_id.as_str());
        let new_key = self.key_for(&sop.sop_id, &new_filename);

        let body = serde_json::to_vec(&draft).map_err(|e| ElnError::invalid(e.to_string()))?;
        self.storage.put_bytes(&new_key, body.into(), "application/json", false).await?;

        if let Some((old_key, _)) = &existing {
            if old_key != &new_key {
                if let Err(e) = self.storage.delete(old_key).await {
                    tracing::warn!(error = %e, old_key, "draft save: failed to remove superseded object");
                }
            }
        }

        Ok(draft_id)
    }

    pub async fn get(&self, user: &User, sop: &SopDescriptor, draft_id: &DraftId) -> Result<Draft, ElnError> {
        let (key, _) = self
            .find_existing(sop, draft_id)
            .await?
            .ok_or_else(|| ElnError::not_found("draft", draft_id.as_str()))?;
        let body = self.storage.get(&key).await?;
        let draft: Draft = serde_json::from_slice(&body).map_err(|e| ElnError::invalid(e.to_string()))?;
        if draft.owner_id != user.id && !user.is_admin {
            return Err(ElnError::forbidden("draft is owned by another user"));
        }
        Ok(draft)
    }

    /// Ordered by `updated_at` descending, ties broken by `draft_id`
    /// ascending (spec §4.6). Non-owned drafts are filtered out before any
    /// body is read; owned drafts are then fetched for their title and
    /// completion percentage. Expired drafts are pruned before the owner
    /// filter runs, so they never appear in anyone's results.
    pub async fn list(&self, user: &User, sop: &SopDescriptor) -> Result<Vec<DraftMetadata>, ElnError> {
        let keys = self.sweep_sop(sop).await?;
        let mut owned_keys = Vec::new();
        for key in keys {
            let Some(filename) = key.rsplit('/').next() else { continue };
            if !filename.starts_with("draft_") {
                continue;
            }
            let Ok(decoded) = filename_codec::decode_draft(filename, sop.filename_component_count()) else {
                continue;
            };
            if decoded.owner_id == user.id || user.is_admin {
                owned_keys.push(key);
            }
        }

        let mut metadata = Vec::with_capacity(owned_keys.len());
        for key in owned_keys {
            let body = self.storage.get(&key).await?;
            let draft: Draft = serde_json::from_slice(&body).map_err(|e| ElnError::invalid(e.to_string()))?;
            metadata.push(DraftMetadata::from(&draft));
        }

        metadata.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.draft_id.as_str().cmp(b.draft_id.as_str()))
        });
        Ok(metadata)
    }

    /// Lists `{draft_root}/{sop_id}/`'s keys, deleting (best-effort) any
    /// draft whose filename timestamp is past `retention`, and returns the
    /// survivors. Shared by `list`'s on-access path and a periodic sweeper
    /// task (spec §9: "any of the three [TTL triggers] is compatible").
    pub async fn sweep_sop(&self, sop: &SopDescriptor) -> Result<Vec<String>, ElnError> {
        let keys = self.storage.list(&self.sop_prefix(&sop.sop_id)).await?;
        let now = self.clock.now();
        let mut survivors = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(filename) = key.rsplit('/').next() else { continue };
            if !filename.starts_with("draft_") {
                survivors.push(key);
                continue;
            }
            let expired = match filename_codec::decode_draft(filename, sop.filename_component_count()) {
                Ok(decoded) => {
                    let age = now.signed_duration_since(decoded.timestamp);
                    age.to_std().map(|age| age > self.retention).unwrap_or(false)
                }
                Err(_) => false,
            };
            if expired {
                if let Err(e) = self.storage.delete(&key).await {
                    tracing::warn!(error = %e, key, "ttl sweep: failed to remove expired draft");
                } else {
                    tracing::info!(key, "ttl sweep: removed expired draft");
                }
            } else {
                survivors.push(key);
            }
        }
        Ok(survivors)
    }

    /// Deletes the draft body and every staged attachment it references
    /// (spec §8: "Deleting a draft removes the draft body and all its
    /// staged attachments; submissions referencing the same `temp_id`s are
    /// unaffected" — attachments already moved into a submission are a
    /// separate physical object and untouched by this call).
    pub async fn delete(&self, user: &User, sop: &SopDescriptor, draft_id: &DraftId) -> Result<(), ElnError> {
        let (key, _) = self
            .find_existing(sop, draft_id)
            .await?
            .ok_or_else(|| ElnError::not_found("draft", draft_id.as_str()))?;
        let body = self.storage.get(&key).await?;
        let draft: Draft = serde_json::from_slice(&body).map_err(|e| ElnError::invalid(e.to_string()))?;
        if draft.owner_id != user.id && !user.is_admin {
            return Err(ElnError::forbidden("draft is owned by another user"));
        }

        for staged in &draft.staged_files {
            let stored_filename = filename_codec::encode_staged_file(
                &draft.owner_id,
                &staged.field_id,
                staged.temp_id.as_str(),
                &staged.original_name,
            );
            let path = format!("{}/{}/attachments/{}", self.draft_root, sop.sop_id, stored_filename);
            if let Err(e) = self.storage.delete(&path).await {
                tracing::warn!(error = %e, path, "draft delete: failed to remove staged attachment");
            }
        }

        self.storage.delete(&key).await
    }

    /// Optional periodic sweep for tenants with no `list` traffic to piggy
    /// back the on-access prune on (spec §9 SUPPLEMENT). Intended to be
    /// spawned once at startup: `tokio::spawn(store.run_periodic_sweep(sops, interval))`.
    pub async fn run_periodic_sweep(self: Arc<Self>, sops: Vec<SopDescriptor>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            for sop in &sops {
                if let Err(e) = self.sweep_sop(sop).await {
                    tracing::warn!(error = %e, sop_id = %sop.sop_id, "periodic ttl sweep failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_storage::FsStorageAdapter;
    use eln_domain::entities::SopField;
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

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@acme.org"),
            groups: vec![],
            permissions: vec!["draft:*".into()],
            is_admin: false,
        }
    }

    fn store() -> (DraftStore<FsStorageAdapter, SystemClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorageAdapter::new(dir.path()));
        let clock = Arc::new(SystemClock);
        (DraftStore::new(storage, clock, Tenant::parse("acme").unwrap(), "drafts"), dir)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (store, _dir) = store();
        let alice = user("alice");
        let sop = sop();

        let draft_id = store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "Untitled".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let draft = store.get(&alice, &sop, &draft_id).await.unwrap();
        assert_eq!(draft.owner_id, "alice");
        assert_eq!(draft.filename_variables, vec!["P7".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn non_owner_save_is_forbidden() {
        let (store, _dir) = store();
        let alice = user("alice");
        let bob = user("bob");
        let sop = sop();

        let draft_id = store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "Untitled".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let err = store
            .save(
                &bob,
                &sop,
                SaveDraftParams {
                    draft_id: Some(draft_id),
                    session_id: "s1".into(),
                    title: "Hijacked".into(),
                    completion_percentage: 50,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ElnError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn non_owner_get_is_forbidden_not_a_silent_404() {
        let (store, _dir) = store();
        let alice = user("alice");
        let bob = user("bob");
        let sop = sop();

        let draft_id = store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "Untitled".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let err = store.get(&bob, &sop, &draft_id).await.unwrap_err();
        assert!(matches!(err, ElnError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn list_only_returns_callers_own_drafts() {
        let (store, _dir) = store();
        let alice = user("alice");
        let bob = user("bob");
        let sop = sop();

        store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "Alice draft".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();
        store
            .save(
                &bob,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s2".into(),
                    title: "Bob draft".into(),
                    completion_percentage: 20,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P8".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let alice_drafts = store.list(&alice, &sop).await.unwrap();
        assert_eq!(alice_drafts.len(), 1);
        assert_eq!(alice_drafts[0].owner_id, "alice");
    }

    #[tokio::test]
    async fn resaving_same_draft_replaces_old_object() {
        let (store, _dir) = store();
        let alice = user("alice");
        let sop = sop();

        let draft_id = store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "v1".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: Some(draft_id.clone()),
                    session_id: "s1".into(),
                    title: "v2".into(),
                    completion_percentage: 80,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), "S9".into()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let drafts = store.list(&alice, &sop).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "v2");
    }

    #[tokio::test]
    async fn list_prunes_drafts_past_retention() {
        use eln_ports::FixedClock;

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorageAdapter::new(dir.path()));
        let alice = user("alice");
        let sop = sop();

        let old_clock = Arc::new(FixedClock(chrono::Utc::now() - chrono::Duration::days(60)));
        let old_store = DraftStore::with_retention(
            storage.clone(),
            old_clock,
            Tenant::parse("acme").unwrap(),
            "drafts",
            Duration::from_secs(30 * 24 * 60 * 60),
        );
        old_store
            .save(
                &alice,
                &sop,
                SaveDraftParams {
                    draft_id: None,
                    session_id: "s1".into(),
                    title: "Stale".into(),
                    completion_percentage: 10,
                    form_data: BTreeMap::new(),
                    filename_variables: vec!["P7".into(), String::new()],
                    field_ids: vec!["project_id".into(), "sample_id".into()],
                },
            )
            .await
            .unwrap();

        let now_clock = Arc::new(FixedClock(chrono::Utc::now()));
        let now_store = DraftStore::with_retention(
            storage,
            now_clock,
            Tenant::parse("acme").unwrap(),
            "drafts",
            Duration::from_secs(30 * 24 * 60 * 60),
        );
        let drafts = now_store.list(&alice, &sop).await.unwrap();
        assert!(drafts.is_empty());
    }
}
