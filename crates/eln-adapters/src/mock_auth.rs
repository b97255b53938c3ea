//! Static mock identity provider (C2), for local development and tests.
//!
//! Tokens are opaque lookup keys into a fixed user table instead of signed
//! JWTs — no network, no JWKS, no signature check.

use std::collections::HashMap;

use eln_domain::errors::ElnError;
use eln_domain::User;
use eln_ports::IdentityProvider;

/// Maps a bearer token string directly to a `User`. Construct with
/// [`MockIdentityProvider::with_users`] in tests; `local_dev` seeds a
/// couple of convenience accounts for running the API without an IdP.
pub struct MockIdentityProvider {
    users: HashMap<String, User>,
}

impl MockIdentityProvider {
    pub fn with_users(users: HashMap<String, User>) -> Self {
        Self { users }
    }

    pub fn local_dev() -> Self {
        let mut users = HashMap::new();
        users.insert(
            "dev-admin-token".to_string(),
            User {
                id: "dev_admin".into(),
                email: "dev-admin@localhost".into(),
                groups: vec!["ADMINS".into()],
                permissions: vec!["*".into()],
                is_admin: true,
            },
        );
        users.insert(
            "dev-researcher-token".to_string(),
            User {
                id: "dev_researcher".into(),
                email: "dev-researcher@localhost".into(),
                groups: vec!["RESEARCHERS".into()],
                permissions: vec!["submit:*".into(), "draft:*".into(), "view:own".into()],
                is_admin: false,
            },
        );
        Self { users }
    }
}

impl IdentityProvider for MockIdentityProvider {
    async fn validate(&self, bearer: &str) -> Result<User, ElnError> {
        self.users.get(bearer).cloned().ok_or(ElnError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let provider = MockIdentityProvider::local_dev();
        let err = provider.validate("nonsense").await.unwrap_err();
        assert!(matches!(err, ElnError::Unauthenticated));
    }

    #[tokio::test]
    async fn known_token_resolves_to_its_user() {
        let provider = MockIdentityProvider::local_dev();
        let user = provider.validate("dev-admin-token").await.unwrap();
        assert_eq!(user.id, "dev_admin");
        assert!(user.is_admin);
    }
}
