//! Event handler for GameServer notifications
//!
//! Entry points mirror the watch verbs: added, updated, deleted. Each
//! admitted notification becomes one tracked task running the pipeline
//! under a per-identity lock, so overlapping notifications for the
//! same GameServer serialize while unrelated ones stay concurrent.
//! Entry points never fail; pipeline errors are retried in-task with
//! bounded backoff and then dropped with an error log.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::gameserver::{admit, Admission, GameServer, SkipReason};
use crate::pipeline::{self, Reconcilers};
use crate::retry::compute_backoff;
use crate::singleflight::KeyedLocks;

pub struct Handler {
    reconcilers: Reconcilers,
    locks: Arc<KeyedLocks>,
    tracker: TaskTracker,
}

impl Handler {
    pub fn new(reconcilers: Reconcilers) -> Self {
        Self {
            reconcilers,
            locks: Arc::new(KeyedLocks::new()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn on_added(&self, gs: &GameServer) {
        self.dispatch(gs);
    }

    /// Only the new snapshot matters; the previous version is ignored.
    pub fn on_updated(&self, _old: Option<&GameServer>, new: &GameServer) {
        self.dispatch(new);
    }

    /// Deletion needs no action: derived objects are owner-referenced
    /// to the GameServer and cluster garbage collection removes them.
    pub fn on_deleted(&self, gs: &GameServer) {
        info!(gameserver = %gs.namespaced_name(), "GameServer deleted");
    }

    fn dispatch(&self, gs: &GameServer) {
        let id = gs.namespaced_name();

        match admit(gs) {
            Admission::Skip(SkipReason::MissingAnnotation) => {
                info!(gameserver = %id, "Skipped, ingress-mode annotation not set");
            }
            Admission::Skip(SkipReason::Shutdown) => {
                info!(gameserver = %id, "Skipped, gameserver is shutting down");
            }
            Admission::Skip(SkipReason::State) => {
                info!(
                    gameserver = %id,
                    state = ?gs.state(),
                    "Skipped, requires Scheduled, RequestReady or Ready state"
                );
            }
            Admission::Admitted => {
                let gs = gs.clone();
                let reconcilers = self.reconcilers.clone();
                let locks = Arc::clone(&self.locks);
                self.tracker.spawn(async move {
                    let _guard = locks.acquire(&gs.namespaced_name()).await;
                    run_with_retry(&reconcilers, &gs).await;
                });
            }
        }
    }

    /// Close the tracker and wait for in-flight pipelines to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Run the pipeline, retrying transient failures with backoff until
/// the policy gives up.
async fn run_with_retry(reconcilers: &Reconcilers, gs: &GameServer) {
    let id = gs.namespaced_name();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match pipeline::run(reconcilers, gs).await {
            Ok(()) => return,
            Err(pipeline_error) => {
                let kind = pipeline::classify(&pipeline_error);
                warn!(
                    gameserver = %id,
                    error = %pipeline_error,
                    attempt,
                    error_kind = ?kind,
                    "Pipeline error"
                );
                match compute_backoff(attempt, kind) {
                    Some(delay) => sleep(delay).await,
                    None => {
                        error!(
                            gameserver = %id,
                            error = %pipeline_error,
                            "Dropping event, waiting for next notification"
                        );
                        return;
                    }
                }
            }
        }
    }
}
