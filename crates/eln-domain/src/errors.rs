//! Error taxonomy
//!
//! Per spec §7: kinds, not type names. Every port and adapter error collapses
//! into one of these before it crosses a component boundary, so the Request
//! Surface has a single place to map domain meaning onto HTTP status codes.

use thiserror::Error;

/// The shared error taxonomy for the ELN storage and lifecycle subsystem.
#[derive(Debug, Error)]
pub enum ElnError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("invalid: {reason}")]
    Invalid { reason: String },

    #[error("too large: {size_bytes} bytes exceeds limit of {limit_bytes}")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("forbidden type: {extension}")]
    ForbiddenType { extension: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("partial failure: {} attachment(s) pending", pending.len())]
    PartialFailure { pending: Vec<String> },

    #[error("auth provider unreachable: {message}")]
    ProviderUnreachable { message: String },
}

impl ElnError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}
