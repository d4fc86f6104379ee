use std::sync::Arc;

use anyhow::Context;
use tokenline_auth::storage::{RefreshTokenStorage, SubjectDirectory};
use tokenline_auth::{
    CleanupScheduler, DynClock, DynRevocationCache, InMemoryRefreshTokenStorage, RotationService,
    SigningKey, StaticSubjectDirectory, SystemClock, TokenCodec, revocation::spawn_sweeper,
};
use tokenline_auth_postgres::PostgresAuthStorage;
use tokenline_auth_redis::create_revocation_cache;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, StorageBackend, StorageConfig};

/// Refresh token store and subject directory backing one server.
#[derive(Clone)]
pub struct Stores {
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    pub subjects: Arc<dyn SubjectDirectory>,
}

impl Stores {
    /// Opens the configured backend, running migrations when asked to.
    pub async fn open(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::warn!(
                    "Using in-memory storage; refresh tokens are lost on restart and subjects must be registered in-process"
                );
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                let pg = &config.postgres;
                let storage = PostgresAuthStorage::connect(&pg.url, pg.max_connections)
                    .await
                    .context("connecting to PostgreSQL")?;
                if pg.run_migrations {
                    storage.migrate().await.context("running migrations")?;
                }
                tracing::info!(max_connections = pg.max_connections, "PostgreSQL storage ready");
                Ok(Self {
                    refresh_tokens: Arc::new(storage.refresh_tokens()),
                    subjects: Arc::new(storage.subjects()),
                })
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            refresh_tokens: Arc::new(InMemoryRefreshTokenStorage::new()),
            subjects: Arc::new(StaticSubjectDirectory::new()),
        }
    }
}

pub struct ServerBuilder {
    config: AppConfig,
    clock: DynClock,
    stores: Option<Stores>,
}

pub struct TokenlineServer {
    service: Arc<RotationService>,
    cleanup: Arc<CleanupScheduler>,
    revocations: DynRevocationCache,
    sweep_interval: std::time::Duration,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            clock: Arc::new(SystemClock),
            stores: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn with_clock(mut self, clock: DynClock) -> Self {
        self.clock = clock;
        self
    }

    /// Uses the given stores instead of opening the configured backend.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub async fn build(self) -> anyhow::Result<TokenlineServer> {
        let auth = &self.config.auth;

        let stores = match self.stores {
            Some(stores) => stores,
            None => Stores::open(&self.config.storage).await?,
        };

        let revocations = create_revocation_cache(&self.config.redis, self.clock.clone()).await;

        let key = SigningKey::from_config(&auth.signing).context("loading signing key")?;
        tracing::info!(
            algorithm = %key.algorithm,
            issuer = %auth.issuer,
            "Credential signing key loaded"
        );
        let codec = Arc::new(TokenCodec::new(key, auth.issuer.clone(), self.clock.clone()));

        let service = Arc::new(RotationService::new(
            stores.refresh_tokens.clone(),
            revocations.clone(),
            stores.subjects,
            codec,
            self.clock.clone(),
            auth.tokens.clone(),
        ));

        let cleanup = Arc::new(CleanupScheduler::new(
            stores.refresh_tokens,
            self.clock,
            auth.cleanup.clone(),
            auth.tokens.store_timeout,
        ));

        Ok(TokenlineServer {
            service,
            cleanup,
            revocations,
            sweep_interval: auth.revocation.sweep_interval,
        })
    }
}

impl TokenlineServer {
    /// The rotation engine and access gate.
    pub fn service(&self) -> Arc<RotationService> {
        self.service.clone()
    }

    pub fn revocation_backend(&self) -> &'static str {
        self.revocations.backend_name()
    }

    /// Starts the background tasks: store cleanup, plus the denylist sweep
    /// when the revocation backend has no native expiry.
    pub fn spawn_background(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![self.cleanup.clone().start(shutdown.clone())];

        if self.revocations.needs_sweep() {
            tasks.push(spawn_sweeper(
                self.revocations.clone(),
                self.sweep_interval,
                shutdown,
            ));
        }

        tasks
    }

    /// Runs until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal.cancel();
        });
        self.run_until(shutdown).await
    }

    /// Runs until `shutdown` is cancelled, then waits for background tasks.
    pub async fn run_until(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let tasks = self.spawn_background(shutdown.clone());
        tracing::info!(
            revocation_backend = self.revocation_backend(),
            background_tasks = tasks.len(),
            "tokenline ready"
        );

        shutdown.cancelled().await;

        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("tokenline stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
