//! ELN Vault Port Traits
//!
//! Defines the interfaces adapters must implement:
//! - StorageAdapter (C4): uniform object-store contract over cloud/fs backends
//! - IdentityProvider (C2): bearer token validation
//! - Clock: deterministic time for tests
//!
//! Trait methods return `impl Future<...> + Send` rather than using
//! `#[async_trait]`, so adapters pay no boxing cost on the hot storage path.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use eln_domain::errors::ElnError;
use futures::Stream;

/// A boxed stream of byte chunks, used for uploads that must not be
/// buffered whole in memory (spec §4.4). Carries an explicit lifetime so a
/// stream borrowed from a request body (e.g. a multipart field) can be
/// driven straight into `put_stream` without first collecting it into an
/// owned, `'static` buffer.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'a>>;

/// Uniform object-store contract (spec §4.4). One implementation per
/// backend (cloud blob store, local filesystem); both must honor
/// conditional-create on `put` and atomic-ish `move`.
pub trait StorageAdapter: Send + Sync {
    /// Write `bytes` to `path`. When `conditional` is true the write fails
    /// `Conflict` if `path` already exists (submission writes); when false
    /// it unconditionally overwrites (draft writes).
    fn put_bytes(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        conditional: bool,
    ) -> impl Future<Output = Result<(), ElnError>> + Send;

    /// Streaming variant of `put_bytes` for uploads above the configured
    /// threshold (spec §4.4): never buffers the whole body in memory.
    fn put_stream(
        &self,
        path: &str,
        stream: ByteStream<'_>,
        content_type: &str,
        conditional: bool,
    ) -> impl Future<Output = Result<(), ElnError>> + Send;

    fn get(&self, path: &str) -> impl Future<Output = Result<Bytes, ElnError>> + Send;

    /// Lexicographic ordering on the backend key (spec §4.4); callers
    /// needing chronological order sort on the filename's embedded
    /// timestamp instead.
    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>, ElnError>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = Result<(), ElnError>> + Send;

    /// Atomic within a backend. Cloud backends without a native move
    /// implement copy-then-delete: the copy is conditional on `dst`
    /// non-existence, the delete is best-effort and retried in the
    /// background on failure (spec §4.4, §7).
    fn move_object(&self, src: &str, dst: &str) -> impl Future<Output = Result<(), ElnError>> + Send;

    fn exists(&self, path: &str) -> impl Future<Output = Result<bool, ElnError>> + Send;
}

/// Bearer token validation (spec §4.2). Two implementations: a managed
/// OIDC provider backed by a JWKS cache, and a static mock provider for
/// development and tests.
pub trait IdentityProvider: Send + Sync {
    fn validate(&self, bearer: &str) -> impl Future<Output = Result<eln_domain::User, ElnError>> + Send;
}

/// Deterministic time source, substituted with a fixed clock in tests that
/// assert on embedded filename timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-instant clock for tests that assert on embedded filename
/// timestamps or TTL boundaries.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
