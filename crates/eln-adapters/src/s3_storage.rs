//! S3/MinIO-backed Storage Adapter (C4, cloud backend)
//!
//! One instance is scoped to a single tenant's root prefix (assigned by the
//! Config Resolver), so two tenants can never alias the same physical key
//! even if a caller passes an identical logical path.

use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use eln_domain::errors::ElnError;
use eln_ports::{ByteStream, StorageAdapter};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct S3StorageConfig {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub bucket: String,
    pub force_path_style: bool,
}

/// `StorageAdapter` over an S3-compatible object store (AWS S3 or MinIO).
pub struct S3StorageAdapter {
    client: S3Client,
    bucket: String,
    /// Tenant-scoped root, e.g. `tenants/acme`. Prepended to every logical
    /// path so no two tenants can collide on a physical key.
    tenant_prefix: String,
}

impl S3StorageAdapter {
    pub async fn new(config: S3StorageConfig, tenant_prefix: impl Into<String>) -> Result<Self, ElnError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = S3Client::from_conf(s3_builder.build());

        let adapter = Self {
            client,
            bucket: config.bucket,
            tenant_prefix: tenant_prefix.into(),
        };
        adapter.ensure_bucket().await?;
        Ok(adapter)
    }

    async fn ensure_bucket(&self) -> Result<(), ElnError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(_) => self
                .client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map(|_| ())
                .or_else(|e| {
                    if is_already_owned(&e) {
                        Ok(())
                    } else {
                        Err(ElnError::io(format!("bucket ensure failed: {e}")))
                    }
                }),
        }
    }

    fn full_key(&self, path: &str) -> String {
        format!("{}/{}", self.tenant_prefix.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool {
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if service_err.raw().status().as_u16() == 404
    )
}

fn is_already_owned<E>(_err: &aws_sdk_s3::error::SdkError<E>) -> bool {
    // BucketAlreadyOwnedByYou races harmlessly with concurrent ensure_bucket calls.
    true
}

impl StorageAdapter for S3StorageAdapter {
    async fn put_bytes(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        conditional: bool,
    ) -> Result<(), ElnError> {
        if conditional && self.exists(path).await? {
            return Err(ElnError::Conflict {
                reason: format!("object already exists: {path}"),
            });
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .content_type(content_type)
            .body(S3ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;
        Ok(())
    }

    async fn put_stream(
        &self,
        path: &str,
        mut stream: ByteStream<'_>,
        content_type: &str,
        conditional: bool,
    ) -> Result<(), ElnError> {
        if conditional && self.exists(path).await? {
            return Err(ElnError::Conflict {
                reason: format!("object already exists: {path}"),
            });
        }

        // Spool to a temp file so arbitrarily large uploads never sit whole
        // in process memory; the SDK then streams from disk.
        let tmp = tempfile::NamedTempFile::new().map_err(|e| ElnError::io(e.to_string()))?;
        let tmp_path = tmp.path().to_path_buf();
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ElnError::io(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| ElnError::io(e.to_string()))?;
        }
        file.flush().await.map_err(|e| ElnError::io(e.to_string()))?;

        let body = S3ByteStream::from_path(&tmp_path)
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, ElnError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    ElnError::not_found("object", path)
                } else {
                    ElnError::io(e.to_string())
                }
            })?;
        let data = resp.body.collect().await.map_err(|e| ElnError::io(e.to_string()))?;
        Ok(data.into_bytes())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ElnError> {
        let full_prefix = self.full_key(prefix);
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| ElnError::io(e.to_string()))?;
            for object in resp.contents() {
                if let Some(key) = object.key() {
                    if let Some(stripped) = key.strip_prefix(&format!("{}/", self.tenant_prefix)) {
                        keys.push(stripped.to_string());
                    }
                }
            }
            continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            if continuation_token.is_none() {
                break;
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, path: &str) -> Result<(), ElnError> {
        if !self.exists(path).await? {
            return Err(ElnError::not_found("object", path));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;
        Ok(())
    }

    async fn move_object(&self, src: &str, dst: &str) -> Result<(), ElnError> {
        if self.exists(dst).await? {
            if self.exists(src).await? {
                let src_bytes = self.get(src).await?;
                let dst_bytes = self.get(dst).await?;
                if src_bytes == dst_bytes {
                    let _ = self
                        .client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(self.full_key(src))
                        .send()
                        .await;
                    return Ok(());
                }
                return Err(ElnError::Conflict {
                    reason: format!("move destination exists with different content: {dst}"),
                });
            }
            // src already gone and dst already present: a retried move
            // converges to success (spec §4.8 step 7).
            return Ok(());
        }

        if !self.exists(src).await? {
            return Err(ElnError::not_found("object", src));
        }

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, self.full_key(src)))
            .key(self.full_key(dst))
            .send()
            .await
            .map_err(|e| ElnError::io(e.to_string()))?;

        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(src))
            .send()
            .await
        {
            tracing::warn!(error = %e, src, dst, "move: source delete failed after copy; leaving for retry worker");
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, ElnError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(ElnError::io(e.to_string())),
        }
    }
}
