use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::EmbedderClient;
use crate::config::Config;
use crate::db::Store;
use crate::services::{AuditRecorder, LogNotifier, Notifier};
use crate::storage::{FsObjectStorage, ObjectStorage};

/// Build a shared HTTP client with reasonable defaults for API calls.
/// Reused across all HTTP-based services to enable connection pooling and
/// avoid socket exhaustion.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .user_agent("MediVault/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub embedder: Arc<EmbedderClient>,

    pub storage: Arc<dyn ObjectStorage>,

    pub notifier: Arc<dyn Notifier>,

    pub audit: AuditRecorder,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.database.url,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let http_client =
            build_shared_http_client(config.ai_service.request_timeout_seconds)?;
        let embedder = Arc::new(EmbedderClient::with_shared_client(
            http_client,
            config.ai_service.base_url.clone(),
        ));

        let storage: Arc<dyn ObjectStorage> =
            Arc::new(FsObjectStorage::new(config.storage.root.clone()));

        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let audit = AuditRecorder::new(store.clone());

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            embedder,
            storage,
            notifier,
            audit,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
