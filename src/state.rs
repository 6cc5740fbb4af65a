use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::{jwt::JwtKeys, password::PasswordHasher},
    config::AppConfig,
    users::{
        memory::MemoryUserStore,
        repo::{PgUserStore, UserStore},
        services::AccountService,
    },
};

/// Database URLs with this prefix select the non-persistent in-memory store.
pub const MEMORY_STORE_PREFIX: &str = "memory://";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub accounts: AccountService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let users: Arc<dyn UserStore> = if config.database_url.starts_with(MEMORY_STORE_PREFIX) {
            warn!("using the in-memory user store; accounts are lost on restart");
            Arc::new(MemoryUserStore::new())
        } else {
            Arc::new(
                PgUserStore::connect(&config.database_url, config.database_max_connections)
                    .await?,
            )
        };

        Ok(Self::from_parts(Arc::new(config), users))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserStore>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let hasher = PasswordHasher::new(config.password.algorithm, config.password.cost);
        let accounts = AccountService::new(users, hasher, keys.clone());
        Self {
            config,
            keys,
            accounts,
        }
    }

    /// State over a fresh in-memory store with a cheap hash cost.
    #[cfg(test)]
    pub fn fake() -> (Self, Arc<MemoryUserStore>) {
        use crate::{
            auth::password::HashAlgorithm,
            config::{JwtConfig, PasswordConfig},
        };

        let config = Arc::new(AppConfig {
            database_url: MEMORY_STORE_PREFIX.into(),
            database_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            environment: "test".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_minutes: 60,
            },
            password: PasswordConfig {
                algorithm: HashAlgorithm::Bcrypt,
                cost: 4,
            },
        });
        let store = Arc::new(MemoryUserStore::new());
        (Self::from_parts(config, store.clone()), store)
    }
}
