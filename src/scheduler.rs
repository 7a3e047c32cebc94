//! Recurring background sync across all connected users.
//!
//! One owned task, started at process init and stoppable on shutdown. Each
//! tick enumerates connections holding a token and runs the sync engine per
//! user; a failing user never aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::auth::OAuthClient;
use crate::db::{self, Pool};
use crate::provider::MeetingsProvider;
use crate::sync;

/// Aggregate outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub synced: usize,
    pub failed: usize,
}

pub struct SyncScheduler {
    pool: Pool,
    oauth: Arc<OAuthClient>,
    provider: Arc<dyn MeetingsProvider>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        pool: Pool,
        oauth: Arc<OAuthClient>,
        provider: Arc<dyn MeetingsProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            oauth,
            provider,
            interval,
        }
    }

    /// Run one full tick: sync every connected user sequentially, isolating
    /// per-user failures.
    pub async fn run_once(&self) -> TickSummary {
        let user_ids = match db::list_connected_user_ids(&self.pool).await {
            Ok(ids) => ids,
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to enumerate connections; skipping tick");
                return TickSummary::default();
            }
        };

        if user_ids.is_empty() {
            info!("no connected users; nothing to sync");
            return TickSummary::default();
        }

        let mut summary = TickSummary::default();
        for user_id in &user_ids {
            let report =
                sync::sync_user(&self.pool, &self.oauth, self.provider.as_ref(), user_id).await;
            match &report.error {
                None => {
                    summary.synced += 1;
                }
                Some(err) => {
                    summary.failed += 1;
                    warn!(user_id, error = %err, "scheduled sync failed for user");
                }
            }
        }

        info!(
            users = user_ids.len(),
            synced = summary.synced,
            failed = summary.failed,
            "scheduled sync tick finished"
        );
        summary
    }

    /// Spawn the recurring loop. The first tick fires one interval after
    /// start, matching the original deployment.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "sync scheduler started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        self.run_once().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("sync scheduler stopping");
                        break;
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to the running scheduler task.
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!(?err, "sync scheduler task panicked");
                }
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}
