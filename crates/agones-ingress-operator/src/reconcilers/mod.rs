//! Step reconcilers for the GameServer exposure pipeline
//!
//! Each step derives one resource from a GameServer snapshot: a
//! ClusterIP Service, an Ingress routing the server's FQDN to that
//! Service, and an annotation write-back onto the GameServer itself.
//! The pipeline invokes the steps through the traits below so tests
//! can substitute mocks.

pub mod ingress;
pub mod service;
pub mod status;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use thiserror::Error;

use agones_ingress_common::validation::ValidationError;

use crate::gameserver::GameServer;
use crate::retry::ErrorKind;

/// Field manager for server-side apply patches
pub const FIELD_MANAGER: &str = "agones-ingress-operator";

/// Label selecting the game server pod, set by the fleet manager
pub const GAMESERVER_LABEL: &str = "agones.dev/gameserver";

#[derive(Debug, Error)]
pub enum StepError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("invalid ingress hostname: {0}")]
    InvalidHostname(#[from] ValidationError),
    #[error("gameserver has no allocated or requested port")]
    MissingPort,
    #[error("gameserver has no metadata uid")]
    MissingUid,
}

/// Classify a step error for retry behavior
pub fn classify_error(error: &StepError) -> ErrorKind {
    match error {
        // API errors (conflicts, timeouts, throttling) are worth retrying
        StepError::Kube(_) => ErrorKind::Transient,
        // Bad annotations or incomplete objects need a new snapshot
        StepError::InvalidHostname(_) => ErrorKind::Permanent,
        StepError::MissingPort => ErrorKind::Permanent,
        StepError::MissingUid => ErrorKind::Permanent,
    }
}

/// Result of the Ingress step: the live object plus whether this run
/// changed anything in the cluster.
#[derive(Debug, Clone)]
pub struct IngressOutcome {
    pub ingress: Ingress,
    pub changed: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReconcileService: Send + Sync {
    async fn reconcile(&self, gs: &GameServer) -> Result<Service, StepError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReconcileIngress: Send + Sync {
    async fn reconcile(&self, gs: &GameServer) -> Result<IngressOutcome, StepError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReconcileStatus: Send + Sync {
    async fn reconcile(&self, gs: &GameServer) -> Result<GameServer, StepError>;
}

#[async_trait]
impl<T: ReconcileService + ?Sized> ReconcileService for Arc<T> {
    async fn reconcile(&self, gs: &GameServer) -> Result<Service, StepError> {
        (**self).reconcile(gs).await
    }
}

#[async_trait]
impl<T: ReconcileIngress + ?Sized> ReconcileIngress for Arc<T> {
    async fn reconcile(&self, gs: &GameServer) -> Result<IngressOutcome, StepError> {
        (**self).reconcile(gs).await
    }
}

#[async_trait]
impl<T: ReconcileStatus + ?Sized> ReconcileStatus for Arc<T> {
    async fn reconcile(&self, gs: &GameServer) -> Result<GameServer, StepError> {
        (**self).reconcile(gs).await
    }
}

/// Owner reference pointing derived objects at their GameServer, so
/// cluster garbage collection removes them when the GameServer goes.
pub fn owner_reference(gs: &GameServer) -> Result<OwnerReference, StepError> {
    let meta = gs.meta();
    Ok(OwnerReference {
        api_version: GameServer::api_version(&()).to_string(),
        kind: GameServer::kind(&()).to_string(),
        name: meta.name.clone().unwrap_or_default(),
        uid: meta.uid.clone().ok_or(StepError::MissingUid)?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameserver::testutil::gameserver;
    use crate::gameserver::GameServerState;

    #[test]
    fn test_owner_reference_fields() {
        let gs = gameserver("ns", "game-1", Some(GameServerState::Ready), &[]);
        let owner = owner_reference(&gs).unwrap();

        assert_eq!(owner.api_version, "agones.dev/v1");
        assert_eq!(owner.kind, "GameServer");
        assert_eq!(owner.name, "game-1");
        assert_eq!(owner.uid, "uid-game-1");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owner_reference_missing_uid() {
        let mut gs = gameserver("ns", "game-1", Some(GameServerState::Ready), &[]);
        gs.metadata.uid = None;
        assert!(matches!(owner_reference(&gs), Err(StepError::MissingUid)));
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&StepError::MissingPort),
            ErrorKind::Permanent
        );
        assert_eq!(classify_error(&StepError::MissingUid), ErrorKind::Permanent);
        assert_eq!(
            classify_error(&StepError::InvalidHostname(
                ValidationError::InvalidHostname("bad".to_string())
            )),
            ErrorKind::Permanent
        );
    }
}
