//! ELN Vault Domain Core
//!
//! This crate contains the pure domain logic for the ELN storage and
//! lifecycle subsystem:
//! - Opaque identifiers (Tenant, DraftId, ElnUuid, TempId)
//! - Entities (User, SopDescriptor, Draft, StagedFile, Submission)
//! - The Filename Codec (encode/decode, the reserved delimiter)
//! - The Permission Engine (`action:resource` wildcard matching)
//! - The shared error taxonomy
//!
//! This crate MUST NOT import storage clients, HTTP frameworks, or auth
//! SDKs — those live in `eln-adapters`.

pub mod entities;
pub mod errors;
pub mod filename_codec;
pub mod ids;
pub mod permissions;

pub use entities::*;
pub use errors::*;
pub use ids::*;
