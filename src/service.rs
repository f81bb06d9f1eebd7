use std::sync::Arc;

use crate::error::ConfigError;
use crate::store::CredentialStore;
use crate::token::{TokenEngine, TokenManager, TokenSettings};

/// One credential store and one token manager, shared by every transport.
#[derive(Clone)]
pub struct AuthService {
    pub store: Arc<dyn CredentialStore>,
    pub tokens: Arc<dyn TokenManager>,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: Arc<dyn TokenManager>) -> Self {
        Self { store, tokens }
    }

    /// Binds `store` into `settings` and builds a `TokenEngine` over it.
    pub fn with_engine(
        store: Arc<dyn CredentialStore>,
        mut settings: TokenSettings,
    ) -> Result<Self, ConfigError> {
        settings.store = Some(store.clone());
        let engine = TokenEngine::new(settings)?;
        Ok(Self::new(store, Arc::new(engine)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::schema::StoreConfig;
    use crate::store::InMemoryStore;
    use crate::token::TokenKind;

    #[tokio::test]
    async fn alice_scenario() {
        let schema = StoreConfig::from_yaml(
            r#"
version: 1
table:
  name: users
  columns:
    username: { type: text, primary_key: true, required: true }
    password: { type: text, required: true, hidden: true }
    role: { type: text, default: user, jwt_claim: role }
"#,
        )
        .unwrap()
        .into_schema()
        .unwrap();

        let service = AuthService::with_engine(
            Arc::new(InMemoryStore::new(schema)),
            TokenSettings {
                access_secret: Some("a".into()),
                refresh_secret: Some("r".into()),
                token_lifetime: Some(time::Duration::minutes(1)),
                ..Default::default()
            },
        )
        .unwrap();

        let fields: HashMap<String, String> = [("username", "alice"), ("password", "secret1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        service.store.create_user(fields).await.unwrap();

        let token = service.tokens.generate_token("alice", "secret1").await.unwrap();
        let identity = service.tokens.verify_token(&token, TokenKind::Access).unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role.as_deref(), Some("user"));

        let refresh = service
            .tokens
            .generate_refresh_token("alice", "127.0.0.1")
            .unwrap();
        let renewed = service.tokens.refresh_token(&token, &refresh).unwrap();
        assert_eq!(renewed.username, "alice");
    }

    #[test]
    fn missing_secret_fails_construction() {
        let schema = crate::schema::sample_schema();
        let err = AuthService::with_engine(
            Arc::new(InMemoryStore::new(schema)),
            TokenSettings {
                refresh_secret: Some("r".into()),
                token_lifetime: Some(time::Duration::minutes(1)),
                ..Default::default()
            },
        )
        .err();
        assert_eq!(err, Some(ConfigError::MissingAccessSecret));
    }
}
