//! Wiring of configuration, database, storage and queue

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::catalog::{SqliteStockStore, StockStore};
use crate::config::{Config, repository};
use crate::import::{
    FileStorage, ImportService, ImportWorker, JobQueue, LocalStorage, SqliteJobQueue,
};

/// Shared handles every command works with
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub storage: Arc<dyn FileStorage>,
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn StockStore>,
}

impl AppContext {
    /// Connect to the configured database and storage root
    pub async fn open(config: Config) -> Result<Self> {
        let pool = repository::connect(&config.database_url).await?;

        tokio::fs::create_dir_all(&config.storage_root)
            .await
            .with_context(|| {
                format!(
                    "Failed to create storage directory: {}",
                    config.storage_root.display()
                )
            })?;
        let storage = Arc::new(LocalStorage::new(config.storage_root.clone()));

        Ok(Self::with_parts(config, pool, storage))
    }

    /// Assemble a context from an existing pool and storage backend
    pub fn with_parts(config: Config, pool: SqlitePool, storage: Arc<dyn FileStorage>) -> Self {
        let queue = Arc::new(
            SqliteJobQueue::new(pool.clone()).with_max_attempts(config.worker.max_attempts),
        );
        let store = Arc::new(SqliteStockStore::new(pool.clone()));

        Self {
            config,
            pool,
            storage,
            queue,
            store,
        }
    }

    pub fn import_service(&self) -> ImportService {
        ImportService::new(self.storage.clone(), self.queue.clone())
            .with_max_upload_bytes(self.config.import.max_upload_bytes)
    }

    pub fn worker(&self) -> ImportWorker {
        ImportWorker::new(self.storage.clone(), self.queue.clone(), self.store.clone())
            .with_chunk_size(self.config.import.chunk_size)
            .with_poll_interval(self.config.worker.poll_interval())
            .with_stale_after(self.config.worker.stale_after())
    }
}
