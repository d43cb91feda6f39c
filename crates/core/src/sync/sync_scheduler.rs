//! Periodic sync task.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::sync_model::{SyncRunOutcome, SyncTrigger};
use super::sync_service::SyncService;

/// Delay before the first periodic drain after start-up.
pub const PERIODIC_SYNC_STARTUP_DELAY_SECS: u64 = 2;

/// Handle on the running periodic task. Dropping it without calling
/// [`PeriodicSyncHandle::stop`] leaves the task running.
#[derive(Debug)]
pub struct PeriodicSyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PeriodicSyncHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the loop and waits for it to exit. A drain already in flight
    /// completes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!("[Sync] Periodic task ended abnormally: {}", err);
        }
        info!("[Sync] Periodic sync stopped");
    }
}

pub(crate) fn spawn_periodic(
    service: Arc<SyncService>,
    startup_delay: Duration,
    interval: Duration,
) -> PeriodicSyncHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut trigger = SyncTrigger::Startup;
        let mut delay = startup_delay;
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match service.sync_on_demand(trigger).await {
                SyncRunOutcome::Completed { summary } => debug!(
                    "[Sync] {:?} drain finished status={} synced={} errors={}",
                    trigger,
                    summary.cycle_status(),
                    summary.synced_records,
                    summary.error_records
                ),
                other => debug!("[Sync] {:?} drain skipped: {:?}", trigger, other),
            }

            trigger = SyncTrigger::Periodic;
            delay = interval;
        }
    });

    info!(
        "[Sync] Periodic sync started (every {}s)",
        interval.as_secs()
    );
    PeriodicSyncHandle { shutdown, task }
}
