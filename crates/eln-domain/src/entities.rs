//! Core data model (spec §3): users, SOP descriptors, drafts, staged files,
//! and submissions. These are plain value types; the state transitions
//! between them live in the adapters that own storage (Draft Store, File
//! Stager, Submission Engine), not here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DraftId, ElnUuid, Tenant, TempId};

/// A user derived per-request from a validated token (spec §3). Never
/// persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
    pub is_admin: bool,
}

/// One schema element of an SOP descriptor (spec §9): a leaf field, a
/// grouping container, or a marker that a field participates in filenames.
/// A tagged variant replaces the source's runtime type-sniffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SopField {
    Field {
        id: String,
        field_type: String,
        required: bool,
        validation: Option<String>,
    },
    Container {
        id: String,
        children: Vec<String>,
    },
    FilenameComponent {
        id: String,
        order: usize,
    },
}

impl SopField {
    pub fn id(&self) -> &str {
        match self {
            SopField::Field { id, .. } => id,
            SopField::Container { id, .. } => id,
            SopField::FilenameComponent { id, .. } => id,
        }
    }
}

/// An SOP descriptor: consumed read-only, never owned or mutated by the
/// core (spec §3). Parsed once from its on-disk YAML/JSON form and cached
/// by `(tenant, sop_id, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopDescriptor {
    pub sop_id: String,
    pub version: String,
    pub fields: Vec<SopField>,
    /// Ordered list of field ids whose current values participate in
    /// filenames. Shrinking this list after submissions exist breaks
    /// decode for those prior filenames (spec §4.5); growing it is safe.
    pub filename_component_order: Vec<String>,
}

impl SopDescriptor {
    pub fn filename_component_count(&self) -> usize {
        self.filename_component_order.len()
    }

    /// Extract filename variables positionally from a form-data map,
    /// per `filename_component_order`. Missing values become empty strings,
    /// preserving position (spec §4.8 step 3).
    pub fn extract_filename_variables(&self, form_data: &BTreeMap<String, String>) -> Vec<String> {
        self.filename_component_order
            .iter()
            .map(|field_id| form_data.get(field_id).cloned().unwrap_or_default())
            .collect()
    }
}

/// A mutable, user-owned, in-progress ELN (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: DraftId,
    pub tenant: Tenant,
    pub sop_id: String,
    pub session_id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completion_percentage: u8,
    pub title: String,
    pub form_data: BTreeMap<String, serde_json::Value>,
    pub filename_variables: Vec<String>,
    pub field_ids: Vec<String>,
    pub staged_files: Vec<StagedFile>,
    pub size_bytes: u64,
}

impl Draft {
    /// Invariant per spec §3: `len(filename_variables) == len(field_ids)`.
    pub fn variables_aligned(&self) -> bool {
        self.filename_variables.len() == self.field_ids.len()
    }
}

/// Summary view returned by `Draft Store::list` (spec §4.6) — metadata
/// only, no `form_data`, so listing never requires reading full bodies
/// beyond what the filename already encodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftMetadata {
    pub draft_id: DraftId,
    pub sop_id: String,
    pub owner_id: String,
    pub title: String,
    pub completion_percentage: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Draft> for DraftMetadata {
    fn from(d: &Draft) -> Self {
        Self {
            draft_id: d.draft_id.clone(),
            sop_id: d.sop_id.clone(),
            owner_id: d.owner_id.clone(),
            title: d.title.clone(),
            completion_percentage: d.completion_percentage,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// A file uploaded into a draft's staging area, not yet promoted (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    pub temp_id: TempId,
    pub draft_id: DraftId,
    pub field_id: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Who/when/how a submission came to be (spec §3, `Submission.provenance`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source_draft_id: Option<DraftId>,
    pub session_id: String,
    pub submission_time: DateTime<Utc>,
    pub actor: String,
}

/// An immutable, committed ELN record (spec §3). Once `put` succeeds this
/// value is never mutated or deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub eln_uuid: ElnUuid,
    pub tenant: Tenant,
    pub sop_id: String,
    pub sop_version: String,
    pub filename: String,
    pub submitted_at: DateTime<Utc>,
    pub submitter_id: String,
    pub form_data: BTreeMap<String, serde_json::Value>,
    pub field_definitions_snapshot: Vec<SopField>,
    pub sop_metadata_snapshot: serde_json::Value,
    pub attachments: Vec<StagedFile>,
    pub provenance: Provenance,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_filename_variables_preserves_position_for_missing_fields() {
        let descriptor = SopDescriptor {
            sop_id: "SOP42".into(),
            version: "1".into(),
            fields: vec![],
            filename_component_order: vec!["project_id".into(), "sample_id".into()],
        };
        let mut form_data = BTreeMap::new();
        form_data.insert("project_id".to_string(), "P7".to_string());
        // sample_id intentionally absent

        let variables = descriptor.extract_filename_variables(&form_data);
        assert_eq!(variables, vec!["P7".to_string(), String::new()]);
    }

    #[test]
    fn sop_field_id_dispatches_across_variants() {
        let field = SopField::Field {
            id: "notes".into(),
            field_type: "text".into(),
            required: false,
            validation: None,
        };
        assert_eq!(field.id(), "notes");
    }
}
