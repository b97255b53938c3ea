//! Opaque identifiers
//!
//! Newtype wrappers grounded on the teacher's `LoopId`/`IterationId` pattern:
//! each id is minted from a ULID and never parsed for structure by callers.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::errors::ElnError;
use crate::filename_codec::DELIMITER;

/// The 8-character, delimiter-free alphabet staged file temp ids are drawn
/// from, per spec §3/§4.7. Base32 Crockford (ULID's alphabet) already
/// excludes the delimiter and ambiguous characters, so temp ids are a
/// truncated ULID encoding rather than a second RNG scheme.
const TEMP_ID_LEN: usize = 8;

/// A tenant identifier: lowercase alphanumeric, no separators (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant(String);

impl Tenant {
    pub fn parse(raw: &str) -> Result<Self, ElnError> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(ElnError::invalid(format!(
                "tenant id must be lowercase alphanumeric: {raw}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable-draft identifier: opaque, delimiter-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(String);

impl DraftId {
    pub fn new() -> Self {
        Self(format!("d_{}", Ulid::new()))
    }

    pub fn from_string(s: impl Into<String>) -> Result<Self, ElnError> {
        let s = s.into();
        if s.contains(DELIMITER) {
            return Err(ElnError::invalid("draft id may not contain the reserved delimiter"));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission identifier, `eln_uuid` in spec terms: opaque, unique, frozen
/// for the lifetime of one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElnUuid(String);

impl ElnUuid {
    pub fn new() -> Self {
        Self(format!("e_{}", Ulid::new()))
    }

    pub fn from_string(s: impl Into<String>) -> Result<Self, ElnError> {
        let s = s.into();
        if s.contains(DELIMITER) {
            return Err(ElnError::invalid("eln_uuid may not contain the reserved delimiter"));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ElnUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElnUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staged-file temp id: 8 characters, delimiter-free, round-trips through
/// filenames (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    pub fn new() -> Self {
        let ulid = Ulid::new().to_string();
        Self(ulid[..TEMP_ID_LEN].to_ascii_lowercase())
    }

    pub fn from_string(s: impl Into<String>) -> Result<Self, ElnError> {
        let s = s.into();
        if s.len() != TEMP_ID_LEN || s.contains(DELIMITER) {
            return Err(ElnError::invalid(format!(
                "temp id must be {TEMP_ID_LEN} delimiter-free characters: {s}"
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_rejects_uppercase_and_separators() {
        assert!(Tenant::parse("acme").is_ok());
        assert!(Tenant::parse("Acme").is_err());
        assert!(Tenant::parse("acme-corp").is_err());
        assert!(Tenant::parse("").is_err());
    }

    #[test]
    fn temp_id_is_eight_delimiter_free_chars() {
        let id = TempId::new();
        assert_eq!(id.as_str().len(), 8);
        assert!(!id.as_str().contains(DELIMITER));
    }

    #[test]
    fn ids_reject_embedded_delimiter() {
        assert!(DraftId::from_string("has-dash").is_err());
        assert!(ElnUuid::from_string("has-dash").is_err());
    }
}
