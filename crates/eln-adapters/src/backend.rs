//! Runtime-selected backend dispatch
//!
//! `StorageAdapter`/`IdentityProvider` return `impl Future` rather than a
//! boxed trait object, so they aren't object-safe — a tenant whose
//! resolved config picks a backend at runtime can't be served through a
//! `Box<dyn StorageAdapter>`. These enums give the Request Surface one
//! concrete type per port while still switching backend per tenant,
//! delegating each call to whichever variant is live.

use bytes::Bytes;
use eln_domain::errors::ElnError;
use eln_domain::User;
use eln_ports::{ByteStream, IdentityProvider, StorageAdapter};

use crate::fs_storage::FsStorageAdapter;
use crate::mock_auth::MockIdentityProvider;
use crate::oidc_auth::OidcIdentityProvider;
use crate::s3_storage::S3StorageAdapter;

pub enum AnyStorageAdapter {
    S3(S3StorageAdapter),
    Fs(FsStorageAdapter),
}

impl StorageAdapter for AnyStorageAdapter {
    async fn put_bytes(&self, path: &str, bytes: Bytes, content_type: &str, conditional: bool) -> Result<(), ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.put_bytes(path, bytes, content_type, conditional).await,
            AnyStorageAdapter::Fs(a) => a.put_bytes(path, bytes, content_type, conditional).await,
        }
    }

    async fn put_stream(&self, path: &str, stream: ByteStream<'_>, content_type: &str, conditional: bool) -> Result<(), ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.put_stream(path, stream, content_type, conditional).await,
            AnyStorageAdapter::Fs(a) => a.put_stream(path, stream, content_type, conditional).await,
        }
    }

    async fn get(&self, path: &str) -> Result<Bytes, ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.get(path).await,
            AnyStorageAdapter::Fs(a) => a.get(path).await,
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.list(prefix).await,
            AnyStorageAdapter::Fs(a) => a.list(prefix).await,
        }
    }

    async fn delete(&self, path: &str) -> Result<(), ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.delete(path).await,
            AnyStorageAdapter::Fs(a) => a.delete(path).await,
        }
    }

    async fn move_object(&self, src: &str, dst: &str) -> Result<(), ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.move_object(src, dst).await,
            AnyStorageAdapter::Fs(a) => a.move_object(src, dst).await,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, ElnError> {
        match self {
            AnyStorageAdapter::S3(a) => a.exists(path).await,
            AnyStorageAdapter::Fs(a) => a.exists(path).await,
        }
    }
}

pub enum AnyIdentityProvider {
    Oidc(OidcIdentityProvider),
    Mock(MockIdentityProvider),
}

impl IdentityProvider for AnyIdentityProvider {
    async fn validate(&self, bearer: &str) -> Result<User, ElnError> {
        match self {
            AnyIdentityProvider::Oidc(p) => p.validate(bearer).await,
            AnyIdentityProvider::Mock(p) => p.validate(bearer).await,
        }
    }
}
