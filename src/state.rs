use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::schema::{SchemaDescriptor, StoreConfig};
use crate::service::AuthService;
use crate::store::{CredentialStore, InMemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        Self::from_config(config).await
    }

    pub async fn from_config(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let schema = StoreConfig::load(&config.store_config)
            .and_then(StoreConfig::into_schema)
            .with_context(|| format!("load store config {}", config.store_config.display()))?;

        let store: Arc<dyn CredentialStore> = match &config.database_url {
            Some(url) => {
                tracing::info!(table = schema.table(), "using relational credential store");
                Arc::new(PgStore::connect(url, schema).await?)
            }
            None => {
                tracing::warn!(
                    table = schema.table(),
                    "DATABASE_URL not set; users are kept in memory only"
                );
                Arc::new(InMemoryStore::new(schema))
            }
        };

        let auth = AuthService::with_engine(store, config.token_settings())?;
        Ok(Self {
            config,
            auth: Arc::new(auth),
        })
    }

    pub fn from_parts(config: Arc<AppConfig>, auth: Arc<AuthService>) -> Self {
        Self { config, auth }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        self.auth.store.schema()
    }

    /// In-memory state with fixed secrets, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::JwtConfig;

        let config = Arc::new(AppConfig {
            database_url: None,
            store_config: "configs/store.yml".into(),
            jwt: JwtConfig {
                access_secret: "test-access".into(),
                refresh_secret: "test-refresh".into(),
                ttl_minutes: 5,
                refresh_ttl_days: 3,
                refresh_absolute_ttl_days: 15,
                enforce_absolute_expiry: false,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });

        let store = Arc::new(InMemoryStore::new(crate::schema::sample_schema()));
        let auth = AuthService::with_engine(store, config.token_settings()).expect("fake auth service");
        Self::from_parts(config, Arc::new(auth))
    }
}
