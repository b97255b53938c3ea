//! Config Resolver (C1)
//!
//! Deep-merges a base environment record with a tenant override, then lets
//! process environment variables win over both for infrastructure
//! identifiers (spec §4.1) — deployment-time values the provisioner knows
//! but the repository can't.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use eln_domain::errors::ElnError;
use eln_domain::ids::Tenant;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    S3,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityProviderConfig {
    Oidc {
        issuer: String,
        audience: String,
        jwks_uri: String,
    },
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizePolicy {
    pub max_file_bytes: u64,
    pub max_request_bytes: u64,
    /// `None` means "no allow-list restriction"; `forbidden_extensions`
    /// still applies either way (spec §4.7: `ext ∈ allowed ∧ ext ∉ forbidden`).
    pub allowed_extensions: Option<Vec<String>>,
    pub forbidden_extensions: Vec<String>,
}

impl SizePolicy {
    pub fn check_extension(&self, extension: &str) -> Result<(), ElnError> {
        let extension = extension.to_ascii_lowercase();
        if self.forbidden_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
            return Err(ElnError::ForbiddenType { extension });
        }
        if let Some(allowed) = &self.allowed_extensions {
            if !allowed.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
                return Err(ElnError::ForbiddenType { extension });
            }
        }
        Ok(())
    }

    pub fn check_size(&self, size_bytes: u64) -> Result<(), ElnError> {
        if size_bytes > self.max_file_bytes {
            return Err(ElnError::TooLarge {
                size_bytes,
                limit_bytes: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// The aggregate cap across every file in one upload request (spec §5:
    /// "both a per-file size cap and a per-request aggregate cap").
    pub fn check_request_size(&self, total_bytes: u64) -> Result<(), ElnError> {
        if total_bytes > self.max_request_bytes {
            return Err(ElnError::TooLarge {
                size_bytes: total_bytes,
                limit_bytes: self.max_request_bytes,
            });
        }
        Ok(())
    }
}

/// The fully-resolved, per-(tenant, environment) configuration record
/// (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub forms_location: String,
    pub draft_location: String,
    pub submission_location: String,
    pub identity_provider: IdentityProviderConfig,
    pub size_policy: SizePolicy,
    pub retention_days: u32,
    pub cors_origins: Vec<String>,
    pub storage_backend: StorageBackendKind,
    pub storage_root: String,
    pub group_permissions: HashMap<String, Vec<String>>,
}

enum CacheEntry {
    Resolved(Arc<ResolvedConfig>),
    /// A resolution failure, cached until process restart (spec §4.1).
    Failed(String),
}

/// Per-process, lazily-populated `(tenant, environment) -> ResolvedConfig`
/// cache. One `ConfigResolver` is shared across all requests.
pub struct ConfigResolver {
    base: serde_json::Value,
    tenant_overrides: HashMap<Tenant, serde_json::Value>,
    cache: RwLock<HashMap<(Tenant, String), CacheEntry>>,
}

impl ConfigResolver {
    pub fn new(base: serde_json::Value, tenant_overrides: HashMap<Tenant, serde_json::Value>) -> Self {
        Self {
            base,
            tenant_overrides,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, tenant: &Tenant, environment: &str) -> Result<Arc<ResolvedConfig>, ElnError> {
        let cache_key = (tenant.clone(), environment.to_string());
        {
            let guard = self.cache.read().await;
            match guard.get(&cache_key) {
                Some(CacheEntry::Resolved(config)) => return Ok(config.clone()),
                Some(CacheEntry::Failed(reason)) => return Err(ElnError::invalid(reason.clone())),
                None => {}
            }
        }

        let result = self.resolve_uncached(tenant, environment);
        let mut guard = self.cache.write().await;
        match &result {
            Ok(config) => {
                guard.insert(cache_key, CacheEntry::Resolved(config.clone()));
            }
            Err(e) => {
                guard.insert(cache_key, CacheEntry::Failed(e.to_string()));
            }
        }
        result
    }

    fn resolve_uncached(&self, tenant: &Tenant, _environment: &str) -> Result<Arc<ResolvedConfig>, ElnError> {
        let mut merged = self.base.clone();
        if let Some(override_value) = self.tenant_overrides.get(tenant) {
            deep_merge(&mut merged, override_value);
        }

        apply_env_override(&mut merged, "storage_root", &env_var_name(tenant, "STORAGE_ROOT"));
        apply_env_override(&mut merged, "identity_provider/jwks_uri", &env_var_name(tenant, "JWKS_URI"));

        let config: ResolvedConfig = serde_json::from_value(merged).map_err(|e| {
            ElnError::invalid(format!("config resolution failed for tenant '{tenant}': {e}"))
        })?;
        Ok(Arc::new(config))
    }
}

fn env_var_name(tenant: &Tenant, suffix: &str) -> String {
    format!("ELN_{}_{}", tenant.as_str().to_uppercase(), suffix)
}

/// Override a single `/`-separated pointer path with an environment
/// variable's value if set. Environment always wins over the merged
/// record (spec §4.1).
fn apply_env_override(merged: &mut serde_json::Value, pointer_path: &str, env_var: &str) {
    if let Ok(value) = env::var(env_var) {
        let pointer = format!("/{pointer_path}");
        if let Some(slot) = merged.pointer_mut(&pointer) {
            *slot = serde_json::Value::String(value);
        }
    }
}

/// `override_value` wins for scalars; object fields merge recursively;
/// arrays replace wholesale rather than concatenating (spec §4.1).
fn deep_merge(base: &mut serde_json::Value, override_value: &serde_json::Value) {
    match (base, override_value) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_entry) in override_map {
                match base_map.get_mut(key) {
                    Some(base_entry) => deep_merge(base_entry, override_entry),
                    None => {
                        base_map.insert(key.clone(), override_entry.clone());
                    }
                }
            }
        }
        (base_slot, override_value) => {
            *base_slot = override_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn size_policy() -> SizePolicy {
        SizePolicy {
            max_file_bytes: 100,
            max_request_bytes: 250,
            allowed_extensions: None,
            forbidden_extensions: vec![],
        }
    }

    #[test]
    fn request_size_within_aggregate_cap_succeeds() {
        assert!(size_policy().check_request_size(250).is_ok());
    }

    #[test]
    fn request_size_over_aggregate_cap_is_too_large() {
        let err = size_policy().check_request_size(251).unwrap_err();
        assert!(matches!(
            err,
            ElnError::TooLarge { size_bytes: 251, limit_bytes: 250 }
        ));
    }

    fn base_config() -> serde_json::Value {
        json!({
            "forms_location": "forms",
            "draft_location": "drafts",
            "submission_location": "submissions",
            "identity_provider": { "kind": "mock" },
            "size_policy": {
                "max_file_bytes": 10_000_000,
                "max_request_bytes": 50_000_000,
                "allowed_extensions": null,
                "forbidden_extensions": ["exe", "sh"]
            },
            "retention_days": 30,
            "cors_origins": ["https://app.example.com"],
            "storage_backend": "filesystem",
            "storage_root": "/var/lib/eln/default",
            "group_permissions": { "RESEARCHERS": ["submit:*"] }
        })
    }

    #[tokio::test]
    async fn tenant_override_merges_over_base() {
        let tenant = Tenant::parse("acme").unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(
            tenant.clone(),
            json!({ "storage_root": "/var/lib/eln/acme", "retention_days": 90 }),
        );
        let resolver = ConfigResolver::new(base_config(), overrides);

        let resolved = resolver.resolve(&tenant, "production").await.unwrap();
        assert_eq!(resolved.storage_root, "/var/lib/eln/acme");
        assert_eq!(resolved.retention_days, 90);
        assert_eq!(resolved.forms_location, "forms");
    }

    #[tokio::test]
    async fn missing_tenant_falls_back_to_base_unmodified() {
        let tenant = Tenant::parse("acme").unwrap();
        let resolver = ConfigResolver::new(base_config(), HashMap::new());
        let resolved = resolver.resolve(&tenant, "production").await.unwrap();
        assert_eq!(resolved.storage_root, "/var/lib/eln/default");
    }

    #[tokio::test]
    async fn environment_variable_overrides_tenant_value() {
        let tenant = Tenant::parse("acme").unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(tenant.clone(), json!({ "storage_root": "/var/lib/eln/acme" }));
        let resolver = ConfigResolver::new(base_config(), overrides);

        let env_var = env_var_name(&tenant, "STORAGE_ROOT");
        env::set_var(&env_var, "/mnt/provisioned/acme");
        let resolved = resolver.resolve(&tenant, "production").await.unwrap();
        env::remove_var(&env_var);

        assert_eq!(resolved.storage_root, "/mnt/provisioned/acme");
    }

    #[tokio::test]
    async fn resolution_failure_is_cached_as_negative_result() {
        let tenant = Tenant::parse("acme").unwrap();
        let resolver = ConfigResolver::new(json!({ "incomplete": true }), HashMap::new());

        let first = resolver.resolve(&tenant, "production").await;
        let second = resolver.resolve(&tenant, "production").await;
        assert!(first.is_err());
        assert!(second.is_err());
    }
}
