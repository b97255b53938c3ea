//! HTTP handlers binding the ELN storage/lifecycle core to Axum (spec §6).
//!
//! Thin binding layer per §4.9: each handler extracts/validates the bearer
//! token (via the `AuthenticatedUser` extractor), runs the relevant
//! permission check, dispatches to the Draft Store / File Stager /
//! Submission Engine, and maps domain errors through `ApiError`. No business
//! logic lives here.

pub mod config;
pub mod drafts;
pub mod elns;
pub mod error;
pub mod files;
pub mod health;
pub mod sops;

pub use error::{ApiError, ApiResult};
