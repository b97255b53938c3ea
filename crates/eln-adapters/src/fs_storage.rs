//! Filesystem-backed Storage Adapter (C4, local/dev backend)
//!
//! Same contract as the S3 adapter: conditional create, atomic-ish move,
//! streaming writes. Grounded on spec §9's strategy note: "the filesystem
//! implementation uses rename within a single volume and may emulate
//! conditional create with a create-exclusive open."

use std::path::{Path, PathBuf};

use bytes::Bytes;
use eln_domain::errors::ElnError;
use eln_ports::{ByteStream, StorageAdapter};
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// `StorageAdapter` over a directory tree. One instance is rooted at a
/// single tenant's directory, assigned by the Config Resolver.
pub struct FsStorageAdapter {
    root: PathBuf,
}

impl FsStorageAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    async fn ensure_parent(path: &Path) -> Result<(), ElnError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ElnError::io(e.to_string()))?;
        }
        Ok(())
    }

    fn to_io_err(err: std::io::Error, path: &str) -> ElnError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ElnError::not_found("object", path)
        } else {
            ElnError::io(err.to_string())
        }
    }
}

impl StorageAdapter for FsStorageAdapter {
    async fn put_bytes(
        &self,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
        conditional: bool,
    ) -> Result<(), ElnError> {
        let target = self.full_path(path);
        Self::ensure_parent(&target).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true);
        if conditional {
            options.create_new(true);
        } else {
            options.create(true);
        }

        let mut file = options.open(&target).await.map_err(|e| {
            if conditional && e.kind() == std::io::ErrorKind::AlreadyExists {
                ElnError::Conflict {
                    reason: format!("object already exists: {path}"),
                }
            } else {
                ElnError::io(e.to_string())
            }
        })?;
        file.write_all(&bytes).await.map_err(|e| ElnError::io(e.to_string()))?;
        file.flush().await.map_err(|e| ElnError::io(e.to_string()))?;
        Ok(())
    }

    async fn put_stream(
        &self,
        path: &str,
        mut stream: ByteStream<'_>,
        content_type: &str,
        conditional: bool,
    ) -> Result<(), ElnError> {
        let target = self.full_path(path);
        Self::ensure_parent(&target).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true);
        if conditional {
            options.create_new(true);
        } else {
            options.create(true);
        }
        let mut file = options.open(&target).await.map_err(|e| {
            if conditional && e.kind() == std::io::ErrorKind::AlreadyExists {
                ElnError::Conflict {
                    reason: format!("object already exists: {path}"),
                }
            } else {
                ElnError::io(e.to_string())
            }
        })?;

        let _ = content_type; // the fs backend does not record content type out-of-band
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ElnError::io(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| ElnError::io(e.to_string()))?;
        }
        file.flush().await.map_err(|e| ElnError::io(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, ElnError> {
        let data = fs::read(self.full_path(path))
            .await
            .map_err(|e| Self::to_io_err(e, path))?;
        Ok(Bytes::from(data))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ElnError> {
        let root = self.full_path(prefix);
        let mut keys = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ElnError::io(e.to_string())),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| ElnError::io(e.to_string()))? {
                let file_type = entry.file_type().await.map_err(|e| ElnError::io(e.to_string()))?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else {
                    let relative = entry
                        .path()
                        .strip_prefix(&self.root)
                        .map_err(|e| ElnError::io(e.to_string()))?
                        .to_string_lossy()
                        .replace(std::path::MAIN_SEPARATOR, "/");
                    keys.push(relative);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, path: &str) -> Result<(), ElnError> {
        fs::remove_file(self.full_path(path))
            .await
            .map_err(|e| Self::to_io_err(e, path))
    }

    async fn move_object(&self, src: &str, dst: &str) -> Result<(), ElnError> {
        let src_path = self.full_path(src);
        let dst_path = self.full_path(dst);

        if dst_path.exists() {
            if src_path.exists() {
                let src_bytes = fs::read(&src_path).await.map_err(|e| ElnError::io(e.to_string()))?;
                let dst_bytes = fs::read(&dst_path).await.map_err(|e| ElnError::io(e.to_string()))?;
                if src_bytes == dst_bytes {
                    let _ = fs::remove_file(&src_path).await;
                    return Ok(());
                }
                return Err(ElnError::Conflict {
                    reason: format!("move destination exists with different content: {dst}"),
                });
            }
            return Ok(());
        }

        if !src_path.exists() {
            return Err(ElnError::not_found("object", src));
        }

        Self::ensure_parent(&dst_path).await?;
        fs::rename(&src_path, &dst_path).await.map_err(|e| ElnError::io(e.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, ElnError> {
        Ok(self.full_path(path).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> (FsStorageAdapter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FsStorageAdapter::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn conditional_put_fails_on_existing_path() {
        let (adapter, _dir) = adapter();
        adapter.put_bytes("a.json", Bytes::from_static(b"1"), "application/json", true).await.unwrap();
        let err = adapter
            .put_bytes("a.json", Bytes::from_static(b"2"), "application/json", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ElnError::Conflict { .. }));
    }

    #[tokio::test]
    async fn unconditional_put_overwrites() {
        let (adapter, _dir) = adapter();
        adapter.put_bytes("a.json", Bytes::from_static(b"1"), "application/json", false).await.unwrap();
        adapter.put_bytes("a.json", Bytes::from_static(b"2"), "application/json", false).await.unwrap();
        assert_eq!(adapter.get("a.json").await.unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn move_is_idempotent_on_retry() {
        let (adapter, _dir) = adapter();
        adapter.put_bytes("src.bin", Bytes::from_static(b"data"), "application/octet-stream", false).await.unwrap();
        adapter.move_object("src.bin", "dst.bin").await.unwrap();
        // src no longer exists; a retried move with the same args converges.
        adapter.move_object("src.bin", "dst.bin").await.unwrap();
        assert_eq!(adapter.get("dst.bin").await.unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn move_conflicts_when_destination_has_different_bytes() {
        let (adapter, _dir) = adapter();
        adapter.put_bytes("src.bin", Bytes::from_static(b"data"), "application/octet-stream", false).await.unwrap();
        adapter.put_bytes("dst.bin", Bytes::from_static(b"other"), "application/octet-stream", false).await.unwrap();
        let err = adapter.move_object("src.bin", "dst.bin").await.unwrap_err();
        assert!(matches!(err, ElnError::Conflict { .. }));
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let (adapter, _dir) = adapter();
        let err = adapter.get("missing.json").await.unwrap_err();
        assert!(matches!(err, ElnError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_returns_sorted_relative_keys() {
        let (adapter, _dir) = adapter();
        adapter.put_bytes("sop/b.json", Bytes::from_static(b"b"), "application/json", false).await.unwrap();
        adapter.put_bytes("sop/a.json", Bytes::from_static(b"a"), "application/json", false).await.unwrap();
        let keys = adapter.list("sop").await.unwrap();
        assert_eq!(keys, vec!["sop/a.json".to_string(), "sop/b.json".to_string()]);
    }
}
