//! The fixed-order reconciliation pipeline
//!
//! Service first, then an optional annotation-driven pause, then
//! Ingress, then the GameServer write-back. A step failure aborts the
//! attempt with the step and identity wrapped into the error; the
//! write-back runs whether or not the Ingress step changed anything.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use agones_ingress_common::annotations::{self, keys, DurationError};

use crate::gameserver::{GameServer, NamespacedName};
use crate::reconcilers::{
    classify_error, ReconcileIngress, ReconcileService, ReconcileStatus, StepError,
};
use crate::retry::ErrorKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to reconcile service for {id}: {source}")]
    Service {
        id: NamespacedName,
        source: StepError,
    },
    #[error("invalid ingress delay for {id}: {source}")]
    InvalidDelay {
        id: NamespacedName,
        source: DurationError,
    },
    #[error("failed to reconcile ingress for {id}: {source}")]
    Ingress {
        id: NamespacedName,
        source: StepError,
    },
    #[error("failed to update gameserver {id}: {source}")]
    Status {
        id: NamespacedName,
        source: StepError,
    },
}

/// Classify a pipeline error for retry behavior
pub fn classify(error: &PipelineError) -> ErrorKind {
    match error {
        // A malformed annotation will not parse any better next time
        PipelineError::InvalidDelay { .. } => ErrorKind::Permanent,
        PipelineError::Service { source, .. }
        | PipelineError::Ingress { source, .. }
        | PipelineError::Status { source, .. } => classify_error(source),
    }
}

/// The three step reconcilers, in pipeline order.
#[derive(Clone)]
pub struct Reconcilers {
    pub service: Arc<dyn ReconcileService>,
    pub ingress: Arc<dyn ReconcileIngress>,
    pub status: Arc<dyn ReconcileStatus>,
}

/// Run the pipeline once for a GameServer snapshot.
pub async fn run(reconcilers: &Reconcilers, gs: &GameServer) -> Result<(), PipelineError> {
    let id = gs.namespaced_name();

    reconcilers
        .service
        .reconcile(gs)
        .await
        .map_err(|source| PipelineError::Service {
            id: id.clone(),
            source,
        })?;

    // The delay annotation pauses between the Service and Ingress
    // steps, e.g. to let an external DNS or LB settle. Only this
    // task sleeps.
    if let Some(parsed) = annotations::try_get_duration(gs.annotations(), keys::INGRESS_DELAY) {
        let delay = parsed.map_err(|source| PipelineError::InvalidDelay {
            id: id.clone(),
            source,
        })?;
        debug!(gameserver = %id, delay = ?delay, "Delaying before ingress step");
        sleep(delay).await;
    }

    let outcome = reconcilers
        .ingress
        .reconcile(gs)
        .await
        .map_err(|source| PipelineError::Ingress {
            id: id.clone(),
            source,
        })?;

    let updated = reconcilers
        .status
        .reconcile(gs)
        .await
        .map_err(|source| PipelineError::Status {
            id: id.clone(),
            source,
        })?;

    if outcome.changed {
        info!(
            gameserver = %id,
            state = ?updated.state(),
            reconciled = true,
            ingress = "created",
            "Reconciled gameserver"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::gameserver::testutil::gameserver;
    use crate::gameserver::GameServerState;
    use crate::reconcilers::{
        IngressOutcome, MockReconcileIngress, MockReconcileService, MockReconcileStatus,
    };
    use crate::testutil::{empty_ingress, empty_service};

    fn ready_gameserver(annotations: &[(&str, &str)]) -> GameServer {
        gameserver("lobby", "game-1", Some(GameServerState::Ready), annotations)
    }

    fn reconcilers(
        service: MockReconcileService,
        ingress: MockReconcileIngress,
        status: MockReconcileStatus,
    ) -> Reconcilers {
        Reconcilers {
            service: Arc::new(service),
            ingress: Arc::new(ingress),
            status: Arc::new(status),
        }
    }

    #[tokio::test]
    async fn test_run_invokes_steps_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut service = MockReconcileService::new();
        let order_s = Arc::clone(&order);
        service.expect_reconcile().times(1).returning(move |_| {
            order_s.lock().unwrap().push("service");
            Ok(empty_service())
        });

        let mut ingress = MockReconcileIngress::new();
        let order_i = Arc::clone(&order);
        ingress.expect_reconcile().times(1).returning(move |_| {
            order_i.lock().unwrap().push("ingress");
            Ok(IngressOutcome {
                ingress: empty_ingress(),
                changed: true,
            })
        });

        let mut status = MockReconcileStatus::new();
        let order_t = Arc::clone(&order);
        status.expect_reconcile().times(1).returning(move |gs| {
            order_t.lock().unwrap().push("status");
            Ok(gs.clone())
        });

        let gs = ready_gameserver(&[(keys::INGRESS_MODE, "true")]);
        run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["service", "ingress", "status"]);
    }

    #[tokio::test]
    async fn test_run_status_runs_when_ingress_unchanged() {
        let mut service = MockReconcileService::new();
        service
            .expect_reconcile()
            .times(1)
            .returning(|_| Ok(empty_service()));

        let mut ingress = MockReconcileIngress::new();
        ingress.expect_reconcile().times(1).returning(|_| {
            Ok(IngressOutcome {
                ingress: empty_ingress(),
                changed: false,
            })
        });

        let mut status = MockReconcileStatus::new();
        status
            .expect_reconcile()
            .times(1)
            .returning(|gs| Ok(gs.clone()));

        let gs = ready_gameserver(&[(keys::INGRESS_MODE, "true")]);
        run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_service_failure_aborts() {
        let mut service = MockReconcileService::new();
        service
            .expect_reconcile()
            .times(1)
            .returning(|_| Err(StepError::MissingPort));

        let mut ingress = MockReconcileIngress::new();
        ingress.expect_reconcile().times(0);

        let mut status = MockReconcileStatus::new();
        status.expect_reconcile().times(0);

        let gs = ready_gameserver(&[(keys::INGRESS_MODE, "true")]);
        let err = run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Service { .. }));
        assert!(err.to_string().contains("lobby/game-1"));
    }

    #[tokio::test]
    async fn test_run_malformed_delay_aborts_after_service() {
        let mut service = MockReconcileService::new();
        service
            .expect_reconcile()
            .times(1)
            .returning(|_| Ok(empty_service()));

        let mut ingress = MockReconcileIngress::new();
        ingress.expect_reconcile().times(0);

        let mut status = MockReconcileStatus::new();
        status.expect_reconcile().times(0);

        let gs = ready_gameserver(&[
            (keys::INGRESS_MODE, "true"),
            (keys::INGRESS_DELAY, "not-a-duration"),
        ]);
        let err = run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidDelay { .. }));
        assert_eq!(classify(&err), ErrorKind::Permanent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delay_holds_back_ingress_step() {
        let mut service = MockReconcileService::new();
        service
            .expect_reconcile()
            .times(1)
            .returning(|_| Ok(empty_service()));

        let ingress_at = Arc::new(Mutex::new(None));
        let mut ingress = MockReconcileIngress::new();
        let ingress_at_w = Arc::clone(&ingress_at);
        ingress.expect_reconcile().times(1).returning(move |_| {
            *ingress_at_w.lock().unwrap() = Some(tokio::time::Instant::now());
            Ok(IngressOutcome {
                ingress: empty_ingress(),
                changed: true,
            })
        });

        let mut status = MockReconcileStatus::new();
        status
            .expect_reconcile()
            .times(1)
            .returning(|gs| Ok(gs.clone()));

        let gs = ready_gameserver(&[
            (keys::INGRESS_MODE, "true"),
            (keys::INGRESS_DELAY, "3000ms"),
        ]);

        let started = tokio::time::Instant::now();
        run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap();

        let reached = ingress_at.lock().unwrap().unwrap();
        assert!(reached - started >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_run_ingress_failure_skips_status() {
        let mut service = MockReconcileService::new();
        service
            .expect_reconcile()
            .times(1)
            .returning(|_| Ok(empty_service()));

        let mut ingress = MockReconcileIngress::new();
        ingress
            .expect_reconcile()
            .times(1)
            .returning(|_| Err(StepError::MissingPort));

        let mut status = MockReconcileStatus::new();
        status.expect_reconcile().times(0);

        let gs = ready_gameserver(&[(keys::INGRESS_MODE, "true")]);
        let err = run(&reconcilers(service, ingress, status), &gs)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Ingress { .. }));
    }
}
