use crate::config::{AppConfig, StoreKind};
use crate::db;
use crate::users::{
    password::PasswordHasher,
    repo::{InMemoryUserStore, PgUserStore, UserStore},
    services::UserDirectory,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub directory: UserDirectory,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn UserStore> = match config.store {
            StoreKind::Postgres => {
                let pool = db::connect(&config).await?;
                db::migrate(&pool).await?;
                Arc::new(PgUserStore::new(pool))
            }
            StoreKind::Memory => {
                tracing::warn!("using in-memory user store; data is lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        Self::from_parts(store, config)
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.password)?;
        Ok(Self {
            directory: UserDirectory::new(store, hasher),
            config,
        })
    }

    /// State backed by a fresh in-memory store and a cheap work factor.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_parts(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(AppConfig::in_memory()),
        )
    }
}
