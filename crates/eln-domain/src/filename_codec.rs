//! Filename Codec (C5)
//!
//! The filename *is* the wire format (spec §4.5): once a submission is
//! written, its name must decode forever. This module is the one place the
//! grammar is encoded, so every caller (Draft Store, Submission Engine,
//! File Stager) goes through the same round-trip-safe functions.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::ElnError;

/// The single reserved delimiter. No component may contain it; the codec
/// scrubs it out deterministically rather than rejecting input (see
/// DESIGN.md's decision on the Open Question).
pub const DELIMITER: char = '-';
const SCRUB_REPLACEMENT: char = '_';
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Replace every occurrence of the reserved delimiter with a safe
/// substitute. Deterministic and total: every input has exactly one
/// scrubbed form, so re-scrubbing an already-scrubbed value is a no-op.
pub fn scrub(raw: &str) -> String {
    raw.replace(DELIMITER, &SCRUB_REPLACEMENT.to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ElnError> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| ElnError::invalid(format!("malformed timestamp '{raw}': {e}")))?;
    Ok(naive.and_utc())
}

/// The structured tuple a submission filename decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSubmission {
    pub timestamp: DateTime<Utc>,
    pub submitter_id: String,
    pub variables: Vec<String>,
    pub eln_uuid: String,
}

/// Encode a submission filename. Total: delimiter-bearing inputs are
/// scrubbed, never rejected, so this never fails.
pub fn encode_submission(
    variables: &[String],
    submitter_id: &str,
    timestamp: DateTime<Utc>,
    eln_uuid: &str,
) -> String {
    let mut parts = vec![format_timestamp(timestamp), scrub(submitter_id)];
    parts.extend(variables.iter().map(|v| scrub(v)));
    parts.push(scrub(eln_uuid));
    format!("{}.json", parts.join(&DELIMITER.to_string()))
}

/// Decode a submission filename. `component_count` must be the SOP's
/// current `filename_component_order` length — the count is not recoverable
/// from the filename alone (spec §4.5).
pub fn decode_submission(
    filename: &str,
    component_count: usize,
) -> Result<DecodedSubmission, ElnError> {
    let stem = filename
        .strip_suffix(".json")
        .ok_or_else(|| ElnError::invalid(format!("malformed submission filename: {filename}")))?;

    let parts: Vec<&str> = stem.split(DELIMITER).collect();
    let expected = component_count + 3; // timestamp, submitter_id, ..., eln_uuid
    if parts.len() != expected {
        return Err(ElnError::invalid(format!(
            "malformed submission filename: expected {expected} delimited fields, got {} in '{filename}'",
            parts.len()
        )));
    }

    let timestamp = parse_timestamp(parts[0])?;
    let submitter_id = parts[1].to_string();
    let variables: Vec<String> = parts[2..2 + component_count]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let eln_uuid = parts[2 + component_count].to_string();

    Ok(DecodedSubmission {
        timestamp,
        submitter_id,
        variables,
        eln_uuid,
    })
}

/// The structured tuple a draft filename decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDraft {
    pub timestamp: DateTime<Utc>,
    pub owner_id: String,
    pub variables: Vec<String>,
    pub draft_id: String,
}

const DRAFT_PREFIX: &str = "draft_";

/// Encode a draft filename: the submission grammar with a `draft_` prefix
/// and `draft_id` standing in for `eln_uuid` (spec §4.5).
pub fn encode_draft(
    variables: &[String],
    owner_id: &str,
    timestamp: DateTime<Utc>,
    draft_id: &str,
) -> String {
    let body = encode_submission(variables, owner_id, timestamp, draft_id);
    format!("{DRAFT_PREFIX}{body}")
}

pub fn decode_draft(filename: &str, component_count: usize) -> Result<DecodedDraft, ElnError> {
    let rest = filename.strip_prefix(DRAFT_PREFIX).ok_or_else(|| {
        ElnError::invalid(format!("malformed draft filename: {filename}"))
    })?;
    let decoded = decode_submission(rest, component_count)?;
    Ok(DecodedDraft {
        timestamp: decoded.timestamp,
        owner_id: decoded.submitter_id,
        variables: decoded.variables,
        draft_id: decoded.eln_uuid,
    })
}

/// The structured tuple a staged attachment filename decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedStagedFile {
    pub owner_id: String,
    pub field_id: String,
    pub temp_id: String,
    pub original_name: String,
}

/// Encode a staged attachment filename: `{owner_id}-{field_id}-{temp_id}-{original_name}`
/// (spec §4.5). `original_name` is preserved as-is except delimiter scrubbing.
pub fn encode_staged_file(owner_id: &str, field_id: &str, temp_id: &str, original_name: &str) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}",
        scrub(owner_id),
        scrub(field_id),
        scrub(temp_id),
        scrub(original_name),
        d = DELIMITER
    )
}

pub fn decode_staged_file(filename: &str) -> Result<DecodedStagedFile, ElnError> {
    let mut parts = filename.splitn(4, DELIMITER);
    let owner_id = parts
        .next()
        .ok_or_else(|| ElnError::invalid(format!("malformed staged filename: {filename}")))?
        .to_string();
    let field_id = parts
        .next()
        .ok_or_else(|| ElnError::invalid(format!("malformed staged filename: {filename}")))?
        .to_string();
    let temp_id = parts
        .next()
        .ok_or_else(|| ElnError::invalid(format!("malformed staged filename: {filename}")))?
        .to_string();
    let original_name = parts
        .next()
        .ok_or_else(|| ElnError::invalid(format!("malformed staged filename: {filename}")))?
        .to_string();
    Ok(DecodedStagedFile {
        owner_id,
        field_id,
        temp_id,
        original_name,
    })
}

/// Scan-on-write assertion (spec §8): fail loudly if any component we're
/// about to persist still contains the delimiter after scrubbing. This
/// should never trip — it exists to catch a codec bug, not user input.
pub fn assert_delimiter_free(component: &str) -> Result<(), ElnError> {
    if component.contains(DELIMITER) {
        return Err(ElnError::invalid(format!(
            "internal error: component still contains delimiter after scrubbing: {component}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn submission_round_trips() {
        let variables = vec!["P7".to_string(), "S9".to_string()];
        let encoded = encode_submission(&variables, "alice_acme_org", ts(), "e_xyz");
        assert_eq!(encoded, "20250130T120000Z-alice_acme_org-P7-S9-e_xyz.json");

        let decoded = decode_submission(&encoded, variables.len()).unwrap();
        assert_eq!(decoded.timestamp, ts());
        assert_eq!(decoded.submitter_id, "alice_acme_org");
        assert_eq!(decoded.variables, variables);
        assert_eq!(decoded.eln_uuid, "e_xyz");
    }

    #[test]
    fn empty_components_are_positionally_preserved() {
        let variables = vec!["P7".to_string(), String::new()];
        let encoded = encode_submission(&variables, "alice_acme_org", ts(), "e_xyz");
        assert_eq!(encoded, "20250130T120000Z-alice_acme_org-P7--e_xyz.json");

        let decoded = decode_submission(&encoded, variables.len()).unwrap();
        assert_eq!(decoded.variables, vec!["P7".to_string(), String::new()]);
    }

    #[test]
    fn all_empty_components_round_trip() {
        let variables = vec![String::new(), String::new(), String::new()];
        let encoded = encode_submission(&variables, "bob", ts(), "e_1");
        let decoded = decode_submission(&encoded, variables.len()).unwrap();
        assert_eq!(decoded.variables, variables);
    }

    #[test]
    fn zero_components_round_trip() {
        let encoded = encode_submission(&[], "bob", ts(), "e_1");
        assert_eq!(encoded, "20250130T120000Z-bob-e_1.json");
        let decoded = decode_submission(&encoded, 0).unwrap();
        assert!(decoded.variables.is_empty());
    }

    #[test]
    fn delimiter_in_component_is_scrubbed_not_rejected() {
        let variables = vec!["a-b".to_string()];
        let encoded = encode_submission(&variables, "bob", ts(), "e_1");
        assert!(!encoded
            .trim_end_matches(".json")
            .split(DELIMITER)
            .any(|p| p.is_empty() && p != ""));
        let decoded = decode_submission(&encoded, 1).unwrap();
        assert_eq!(decoded.variables, vec!["a_b".to_string()]);
    }

    #[test]
    fn wrong_component_count_fails_decode() {
        let variables = vec!["P7".to_string(), "S9".to_string()];
        let encoded = encode_submission(&variables, "alice", ts(), "e_xyz");
        assert!(decode_submission(&encoded, 1).is_err());
        assert!(decode_submission(&encoded, 3).is_err());
    }

    #[test]
    fn draft_round_trips() {
        let variables = vec!["P7".to_string(), String::new()];
        let encoded = encode_draft(&variables, "alice", ts(), "d_abc");
        assert_eq!(encoded, "draft_20250130T120000Z-alice-P7--d_abc.json");

        let decoded = decode_draft(&encoded, variables.len()).unwrap();
        assert_eq!(decoded.owner_id, "alice");
        assert_eq!(decoded.draft_id, "d_abc");
        assert_eq!(decoded.variables, variables);
    }

    #[test]
    fn staged_file_round_trips() {
        let encoded = encode_staged_file("alice", "photo_field", "ab12cd34", "my-photo.png");
        assert_eq!(encoded, "alice-photo_field-ab12cd34-my_photo.png");

        let decoded = decode_staged_file(&encoded).unwrap();
        assert_eq!(decoded.owner_id, "alice");
        assert_eq!(decoded.field_id, "photo_field");
        assert_eq!(decoded.temp_id, "ab12cd34");
        assert_eq!(decoded.original_name, "my_photo.png");
    }

    #[test]
    fn assert_delimiter_free_catches_residual_delimiter() {
        assert!(assert_delimiter_free("clean").is_ok());
        assert!(assert_delimiter_free("dirty-value").is_err());
    }
}
