//! MLC-CORE
//!
//! Keeps a tensor-serving cache in sync with trained model artifacts on disk
//! and tracks which inference targets are currently served.
//!
//! # Pipeline
//!
//! - **Classify**: every file under the model root maps to an [`artifacts::ArtifactKind`]
//! - **Encode**: a codec per kind turns the file into cache writes
//! - **Publish**: writes fan out to one or two replicas, skipping unchanged tensor models
//! - **Serve**: the registry records which targets and groups are live

pub mod artifacts;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod health;
pub mod serving;
pub mod sync;
pub mod telemetry;

use std::sync::Arc;

use tracing::warn;

use artifacts::KeyScheme;
use cache::{CacheStore, RespStore, ReplicaSet};
use config::EnvConfig;
use health::HealthChecker;
use serving::{ConfigStore, ServingController, ServingRegistry};
use sync::{BulkLoader, LoadError, LoadSummary, Publisher};

/// Process-wide wiring, built once at startup.
pub struct SyncRuntime {
    pub config: EnvConfig,
    pub publisher: Arc<Publisher>,
    pub loader: BulkLoader,
    pub registry: ServingRegistry,
    pub health: HealthChecker,
}

impl SyncRuntime {
    /// Connect RESP clients for every configured server.
    pub fn new(config: EnvConfig) -> Self {
        let replicas = ReplicaSet::from_config(&config);
        let backend: Arc<dyn CacheStore> = Arc::new(RespStore::new(config.backend_addr.clone()));
        Self::with_stores(config, replicas, backend)
    }

    /// Wire the runtime over caller-provided stores.
    pub fn with_stores(config: EnvConfig, replicas: ReplicaSet, backend: Arc<dyn CacheStore>) -> Self {
        let publisher = Arc::new(Publisher::new(replicas));
        let loader = BulkLoader::new(
            Arc::clone(&publisher),
            KeyScheme::new(config.model_root.clone()),
            config.role,
        )
        .with_worker_ratio(config.load_worker_ratio);
        let health = HealthChecker::new(config.health.clone());
        Self {
            config,
            publisher,
            loader,
            registry: ServingRegistry::new(backend),
            health,
        }
    }

    pub fn replicas(&self) -> &ReplicaSet {
        self.publisher.replicas()
    }

    /// Controller over this runtime's registry and loader.
    pub fn controller(&self, config_store: Arc<dyn ConfigStore>) -> ServingController {
        ServingController::new(
            self.registry.clone(),
            config_store,
            self.loader.clone(),
            self.config.model_root.clone(),
            self.config.sys_id.clone(),
        )
    }

    /// Load the whole model root once the primary replica answers.
    ///
    /// Returns `None` when the replica never became healthy.
    pub async fn startup_load(&self) -> Result<Option<LoadSummary>, LoadError> {
        if !self.health.primary_ready(self.replicas()).await {
            warn!("cache server is not healthy, skipping model load");
            return Ok(None);
        }
        self.loader.load(&self.config.model_root, false).await.map(Some)
    }
}
