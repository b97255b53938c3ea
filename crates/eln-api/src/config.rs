//! API process configuration
//!
//! Distinct from `eln_adapters::ConfigResolver`, which resolves *tenant*
//! configuration at request time: this is the handful of settings the
//! process needs before it can even build that resolver (spec §4.1's base
//! record and tenant overrides are loaded from disk here, then handed to a
//! `ConfigResolver` that does the per-request merging).

use std::collections::HashMap;
use std::env;

use eln_adapters::ConfigResolver;
use eln_domain::ids::Tenant;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub config_base_path: String,
    pub config_tenants_dir: String,
    pub log_level: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("ELN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("ELN_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3000),
            environment: env::var("ELN_ENVIRONMENT").unwrap_or_else(|_| "production".to_string()),
            config_base_path: env::var("ELN_CONFIG_BASE").unwrap_or_else(|_| "config/base.json".to_string()),
            config_tenants_dir: env::var("ELN_CONFIG_TENANTS_DIR").unwrap_or_else(|_| "config/tenants".to_string()),
            log_level: env::var("ELN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn local_dev() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            config_base_path: "config/base.json".to_string(),
            config_tenants_dir: "config/tenants".to_string(),
            log_level: "debug".to_string(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reads the base config record and every `{tenant_id}.json` override in
    /// `config_tenants_dir`, building the shared `ConfigResolver`. A missing
    /// tenants directory is not an error — tenants fall back to the base
    /// record until an override is added (spec §4.1).
    pub fn build_config_resolver(&self) -> std::io::Result<ConfigResolver> {
        let base_raw = std::fs::read_to_string(&self.config_base_path)?;
        let base: serde_json::Value = serde_json::from_str(&base_raw)?;

        let mut overrides = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&self.config_tenants_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                let Ok(tenant) = Tenant::parse(stem) else {
                    tracing::warn!(file = %path.display(), "skipping tenant override with invalid tenant id");
                    continue;
                };
                let raw = std::fs::read_to_string(&path)?;
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                overrides.insert(tenant, value);
            }
        }

        Ok(ConfigResolver::new(base, overrides))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
