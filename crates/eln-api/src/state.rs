//! Application state and per-tenant component wiring
//!
//! One `ConfigResolver` and one `AppState` are shared across all requests;
//! everything downstream of a resolved tenant config (storage adapter,
//! identity provider, draft store, file stager, submission engine, SOP
//! registry) is built lazily per tenant and cached for the process
//! lifetime, mirroring the Config Resolver's own negative/positive caching
//! (spec §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use eln_adapters::{
    AnyIdentityProvider, AnyStorageAdapter, AttachmentRetryQueue, AttachmentRetryWorker, ConfigResolver, DraftStore,
    FileStager, FsStorageAdapter, IdentityProviderConfig, MockIdentityProvider, OidcConfig, OidcIdentityProvider,
    ResolvedConfig, S3StorageAdapter, S3StorageConfig, SopRegistry, StorageBackendKind, SubmissionEngine,
};
use eln_domain::errors::ElnError;
use eln_domain::ids::Tenant;
use eln_ports::SystemClock;
use tokio::sync::RwLock;

pub struct TenantContext {
    pub tenant: Tenant,
    pub config: Arc<ResolvedConfig>,
    pub storage: Arc<AnyStorageAdapter>,
    pub identity_provider: Arc<AnyIdentityProvider>,
    pub sop_registry: Arc<SopRegistry<AnyStorageAdapter>>,
    pub draft_store: Arc<DraftStore<AnyStorageAdapter, SystemClock>>,
    pub file_stager: Arc<FileStager<AnyStorageAdapter>>,
    pub submission_engine: Arc<SubmissionEngine<AnyStorageAdapter, SystemClock>>,
    pub retry_queue: Arc<AttachmentRetryQueue>,
}

#[derive(Clone)]
pub struct AppState {
    pub config_resolver: Arc<ConfigResolver>,
    pub environment: String,
    tenants: Arc<RwLock<HashMap<Tenant, Arc<TenantContext>>>>,
}

impl AppState {
    pub fn new(config_resolver: Arc<ConfigResolver>, environment: impl Into<String>) -> Self {
        Self {
            config_resolver,
            environment: environment.into(),
            tenants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn tenant(&self, tenant: &Tenant) -> Result<Arc<TenantContext>, ElnError> {
        if let Some(context) = self.tenants.read().await.get(tenant) {
            return Ok(context.clone());
        }

        let config = self.config_resolver.resolve(tenant, &self.environment).await?;
        let context = Arc::new(build_tenant_context(tenant.clone(), config).await?);

        let mut guard = self.tenants.write().await;
        let context = guard.entry(tenant.clone()).or_insert_with(|| context).clone();
        Ok(context)
    }
}

async fn build_tenant_context(tenant: Tenant, config: Arc<ResolvedConfig>) -> Result<TenantContext, ElnError> {
    let storage = Arc::new(build_storage(&tenant, &config).await?);
    let identity_provider = Arc::new(build_identity_provider(&config).await?);
    let sop_registry = Arc::new(SopRegistry::new(storage.clone(), config.forms_location.clone()));
    let clock = Arc::new(SystemClock);
    let retention = std::time::Duration::from_secs(config.retention_days as u64 * 24 * 60 * 60);
    let draft_store = Arc::new(DraftStore::with_retention(
        storage.clone(),
        clock.clone(),
        tenant.clone(),
        config.draft_location.clone(),
        retention,
    ));
    let file_stager = Arc::new(FileStager::new(storage.clone(), config.draft_location.clone()));
    let retry_queue = Arc::new(AttachmentRetryQueue::new());
    let submission_engine = Arc::new(SubmissionEngine::new(
        storage.clone(),
        clock,
        retry_queue.clone(),
        tenant.clone(),
        config.draft_location.clone(),
        config.submission_location.clone(),
    ));

    let worker = AttachmentRetryWorker::new(
        storage.clone(),
        retry_queue.clone(),
        config.draft_location.clone(),
        config.submission_location.clone(),
    );
    tokio::spawn(worker.run());

    Ok(TenantContext {
        tenant,
        config,
        storage,
        identity_provider,
        sop_registry,
        draft_store,
        file_stager,
        submission_engine,
        retry_queue,
    })
}

async fn build_storage(tenant: &Tenant, config: &ResolvedConfig) -> Result<AnyStorageAdapter, ElnError> {
    match config.storage_backend {
        StorageBackendKind::Filesystem => {
            let root = std::path::Path::new(&config.storage_root).join(tenant.as_str());
            Ok(AnyStorageAdapter::Fs(FsStorageAdapter::new(root)))
        }
        StorageBackendKind::S3 => {
            let s3_config = S3StorageConfig {
                endpoint_url: std::env::var("ELN_S3_ENDPOINT_URL").ok(),
                region: std::env::var("ELN_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                bucket: config.storage_root.clone(),
                force_path_style: true,
            };
            let adapter = S3StorageAdapter::new(s3_config, format!("{}/", tenant.as_str())).await?;
            Ok(AnyStorageAdapter::S3(adapter))
        }
    }
}

async fn build_identity_provider(config: &ResolvedConfig) -> Result<AnyIdentityProvider, ElnError> {
    match &config.identity_provider {
        IdentityProviderConfig::Mock => Ok(AnyIdentityProvider::Mock(MockIdentityProvider::local_dev())),
        IdentityProviderConfig::Oidc { issuer, audience, jwks_uri } => {
            let oidc_config = OidcConfig {
                issuer: issuer.clone(),
                audience: audience.clone(),
                jwks_uri: jwks_uri.clone(),
                http_timeout: std::time::Duration::from_secs(5),
            };
            let provider = OidcIdentityProvider::new(oidc_config, config.group_permissions.clone());
            provider.initialize().await?;
            Ok(AnyIdentityProvider::Oidc(provider))
        }
    }
}
