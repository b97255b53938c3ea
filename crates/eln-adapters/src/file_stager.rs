//! File Stager (C7)
//!
//! Receives uploads into a draft-scoped staging area, assigning opaque
//! temp ids that round-trip through the Filename Codec's staged-attachment
//! grammar (spec §4.7).

use std::sync::Arc;

use eln_domain::errors::ElnError;
use eln_domain::filename_codec;
use eln_domain::ids::{DraftId, TempId};
use eln_ports::{ByteStream, StorageAdapter};

use crate::config_resolver::SizePolicy;

pub struct FileStager<S: StorageAdapter> {
    storage: Arc<S>,
    draft_root: String,
}

/// Everything needed to place and name a staged upload.
pub struct UploadRequest<'a> {
    pub sop_id: &'a str,
    pub draft_id: &'a DraftId,
    pub owner_id: &'a str,
    pub field_id: &'a str,
    pub original_name: &'a str,
    pub mime_type: &'a str,
    pub size_hint: u64,
}

#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub temp_id: TempId,
    pub path: String,
    pub stored_filename: String,
}

impl<S: StorageAdapter> FileStager<S> {
    pub fn new(storage: Arc<S>, draft_root: impl Into<String>) -> Self {
        Self {
            storage,
            draft_root: draft_root.into(),
        }
    }

    fn attachment_path(&self, sop_id: &str, stored_filename: &str) -> String {
        format!("{}/{}/attachments/{}", self.draft_root, sop_id, stored_filename)
    }

    /// Stream an upload into storage, enforcing extension policy up front
    /// and `size_hint` as a fast-path size check when the caller can supply
    /// one (spec §4.7 failure cases: `TooLarge`, `ForbiddenType`, `IO`). When
    /// the caller streams a body of unknown length it passes `size_hint: 0`
    /// and enforces the real per-file/aggregate caps itself by counting
    /// bytes as they pass through the stream. The File Stager never
    /// cross-references other drafts' stagings — the destination path is
    /// scoped purely to `sop_id`/`draft_id`/the caller-supplied `owner_id`.
    pub async fn upload(
        &self,
        request: UploadRequest<'_>,
        size_policy: &SizePolicy,
        stream: ByteStream<'_>,
    ) -> Result<StagedUpload, ElnError> {
        size_policy.check_size(request.size_hint)?;
        let extension = extension_of(request.original_name);
        size_policy.check_extension(&extension)?;

        let temp_id = TempId::new();
        let stored_filename =
            filename_codec::encode_staged_file(request.owner_id, request.field_id, temp_id.as_str(), request.original_name);
        filename_codec::assert_delimiter_free(&stored_filename)?;

        let path = self.attachment_path(request.sop_id, &stored_filename);
        self.storage
            .put_stream(&path, stream, request.mime_type, false)
            .await?;

        Ok(StagedUpload {
            temp_id,
            path,
            stored_filename,
        })
    }

    /// Remove a staged file before submission (spec §4.7). After
    /// submission the file belongs to the Submission and this method no
    /// longer applies to it.
    pub async fn delete(&self, sop_id: &str, stored_filename: &str) -> Result<(), ElnError> {
        let path = self.attachment_path(sop_id, stored_filename);
        self.storage.delete(&path).await
    }
}

fn extension_of(original_name: &str) -> String {
    original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}
