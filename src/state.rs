use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::functions::{HttpFunctions, RemoteFunctions};
use crate::realtime::RealtimeHub;
use crate::{db, migrate, AppResult};

/// Database handle plus the change feed every write publishes to.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: RealtimeHub,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            changes: RealtimeHub::new(),
        }
    }

    /// Fresh in-memory database with all migrations applied.
    pub async fn in_memory() -> AppResult<Self> {
        let pool = db::open_memory_pool().await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn changes(&self) -> &RealtimeHub {
        &self.changes
    }
}

/// Services constructed once at startup and shared for the process lifetime.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub functions: Option<Arc<dyn RemoteFunctions>>,
}

impl AppState {
    pub async fn open(config: Config) -> AppResult<Self> {
        let pool = db::open_sqlite_pool(&config.db_path).await?;
        migrate::apply_migrations(&pool).await?;
        let functions = match config.require_functions() {
            Ok(_) => Some(Arc::new(HttpFunctions::from_config(&config)?) as Arc<dyn RemoteFunctions>),
            Err(_) => {
                tracing::info!(target: "villaops", event = "functions_unconfigured");
                None
            }
        };
        Ok(Self {
            config: Arc::new(config),
            store: Store::new(pool),
            functions,
        })
    }

    pub fn functions(&self) -> AppResult<Arc<dyn RemoteFunctions>> {
        match &self.functions {
            Some(f) => Ok(f.clone()),
            None => Err(self
                .config
                .require_functions()
                .err()
                .unwrap_or_else(|| "remote functions unavailable".into())),
        }
    }
}
