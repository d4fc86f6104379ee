//! Periodic garbage collection of refresh token records.
//!
//! Each run deletes, in batches, records that are unrevoked but past either
//! horizon, and revoked records whose last update is older than the
//! revocation retention window. A run is bounded by `max_batches`; whatever
//! remains is picked up on the next tick.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::clock::DynClock;
use crate::config::{CleanupConfig, to_time_duration};
use crate::error::AuthError;
use crate::storage::RefreshTokenStorage;

/// Outcome of a single cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Rows deleted.
    pub deleted: u64,

    /// Batches executed.
    pub batches: usize,

    /// `true` if the run stopped because the batch limit was reached while
    /// full batches were still being returned.
    pub exhausted: bool,
}

/// Batched cleanup of the refresh token store.
pub struct CleanupScheduler {
    storage: Arc<dyn RefreshTokenStorage>,
    clock: DynClock,
    config: CleanupConfig,
    store_timeout: std::time::Duration,
}

impl CleanupScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        storage: Arc<dyn RefreshTokenStorage>,
        clock: DynClock,
        config: CleanupConfig,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            config,
            store_timeout,
        }
    }

    /// Runs one bounded cleanup pass.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if a store call fails or times out. Batches
    /// deleted before the failure stay deleted.
    pub async fn run_once(&self) -> AuthResult<CleanupReport> {
        let now = self.clock.now();
        let cutoff = revocation_cutoff(now, &self.config);
        let batch_size = self.config.batch_size.max(1);

        let mut report = CleanupReport::default();

        loop {
            if report.batches >= self.config.max_batches {
                report.exhausted = true;
                break;
            }

            let ids = self
                .with_timeout(
                    self.storage
                        .find_expired_or_stale_revoked_ids(now, cutoff, batch_size),
                )
                .await?;
            if ids.is_empty() {
                break;
            }

            let fetched = ids.len();
            report.deleted += self.with_timeout(self.storage.delete_by_ids(&ids)).await?;
            report.batches += 1;

            if fetched < batch_size {
                break;
            }
        }

        Ok(report)
    }

    /// Starts the background cleanup loop.
    ///
    /// The first run happens one full interval after start. Errors are logged
    /// and the loop keeps going. The task exits when `shutdown` is cancelled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.config.interval;
            let mut ticker = tokio::time::interval_at(start, self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                interval = ?self.config.interval,
                batch_size = self.config.batch_size,
                max_batches = self.config.max_batches,
                "Refresh token cleanup started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Refresh token cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                match self.run_once().await {
                    Ok(report) if report.deleted > 0 => {
                        tracing::info!(
                            deleted = report.deleted,
                            batches = report.batches,
                            exhausted = report.exhausted,
                            "Refresh token cleanup completed"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!("Refresh token cleanup found nothing to delete");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Refresh token cleanup failed");
                    }
                }
            }
        })
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = AuthResult<T>>,
    ) -> AuthResult<T> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| AuthError::store_unavailable("cleanup store call timed out"))?
    }
}

/// Revoked records last updated before this instant may be deleted.
#[must_use]
pub fn revocation_cutoff(now: OffsetDateTime, config: &CleanupConfig) -> OffsetDateTime {
    now.saturating_sub(to_time_duration(config.revocation_retention))
}
