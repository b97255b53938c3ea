//! ELN Vault Adapter Implementations
//!
//! Provides adapter implementations for the ports defined in `eln-ports`:
//! - S3/MinIO and filesystem `StorageAdapter` impls (C4)
//! - OIDC and mock `IdentityProvider` impls (C2)
//! - Config Resolver (C1)
//! - Draft Store (C6), File Stager (C7), Submission Engine (C8)
//! - the background attachment-move retry worker (§7)

pub mod attachment_retry;
pub mod backend;
pub mod config_resolver;
pub mod draft_store;
pub mod file_stager;
pub mod fs_storage;
pub mod mock_auth;
pub mod oidc_auth;
pub mod s3_storage;
pub mod sop_registry;
pub mod submission_engine;

pub use attachment_retry::{AttachmentRetryQueue, AttachmentRetryWorker, PendingMove};
pub use backend::{AnyIdentityProvider, AnyStorageAdapter};
pub use config_resolver::{ConfigResolver, IdentityProviderConfig, ResolvedConfig, SizePolicy, StorageBackendKind};
pub use draft_store::{DraftStore, SaveDraftParams};
pub use file_stager::{FileStager, StagedUpload, UploadRequest};
pub use fs_storage::FsStorageAdapter;
pub use mock_auth::MockIdentityProvider;
pub use oidc_auth::{OidcConfig, OidcIdentityProvider};
pub use s3_storage::{S3StorageAdapter, S3StorageConfig};
pub use sop_registry::SopRegistry;
pub use submission_engine::{SubmissionEngine, SubmitOutcome, SubmitRequest};
