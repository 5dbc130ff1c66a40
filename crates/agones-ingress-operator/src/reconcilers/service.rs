//! Service step
//!
//! Derives a ClusterIP Service per GameServer, selecting the game
//! server pod by the fleet manager's `agones.dev/gameserver` label and
//! forwarding the allocated port. Applied with server-side apply only
//! when the cached copy differs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client};
use tracing::{debug, info, instrument};

use crate::gameserver::GameServer;

use super::{owner_reference, ReconcileService, StepError, FIELD_MANAGER, GAMESERVER_LABEL};

pub struct ServiceReconciler {
    client: Client,
    store: Store<Service>,
}

impl ServiceReconciler {
    pub fn new(client: Client, store: Store<Service>) -> Self {
        Self { client, store }
    }
}

/// Build the desired Service for a GameServer.
pub(crate) fn desired_service(gs: &GameServer) -> Result<Service, StepError> {
    let id = gs.namespaced_name();
    let port = gs.allocated_port().ok_or(StepError::MissingPort)?;

    let labels: BTreeMap<String, String> = [
        ("app.kubernetes.io/managed-by".to_string(), FIELD_MANAGER.to_string()),
        (GAMESERVER_LABEL.to_string(), id.name.clone()),
    ]
    .into();

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(id.name.clone()),
            namespace: Some(id.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(gs)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some([(GAMESERVER_LABEL.to_string(), id.name)].into()),
            ports: Some(vec![ServicePort {
                name: Some("game".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Whether the cached Service already matches the desired spec.
fn specs_match(existing: &Service, desired: &Service) -> bool {
    let (Some(existing_spec), Some(desired_spec)) = (&existing.spec, &desired.spec) else {
        return false;
    };

    existing_spec.type_ == desired_spec.type_
        && existing_spec.selector == desired_spec.selector
        && ports_match(existing_spec, desired_spec)
}

fn ports_match(existing: &ServiceSpec, desired: &ServiceSpec) -> bool {
    let existing: Vec<_> = existing
        .ports
        .iter()
        .flatten()
        .map(|p| (p.name.clone(), p.port, p.target_port.clone(), p.protocol.clone()))
        .collect();
    let desired: Vec<_> = desired
        .ports
        .iter()
        .flatten()
        .map(|p| (p.name.clone(), p.port, p.target_port.clone(), p.protocol.clone()))
        .collect();
    existing == desired
}

#[async_trait]
impl ReconcileService for ServiceReconciler {
    #[instrument(skip(self, gs), fields(gameserver = %gs.namespaced_name()))]
    async fn reconcile(&self, gs: &GameServer) -> Result<Service, StepError> {
        let id = gs.namespaced_name();
        let desired = desired_service(gs)?;

        let cached = self
            .store
            .get(&ObjectRef::new(&id.name).within(&id.namespace));
        if let Some(existing) = cached {
            if specs_match(&existing, &desired) {
                debug!("Service up to date");
                return Ok(Arc::unwrap_or_clone(existing));
            }
        }

        let api: Api<Service> = Api::namespaced(self.client.clone(), &id.namespace);
        let applied = api
            .patch(
                &id.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&desired),
            )
            .await?;

        info!(service = %id.name, "Applied service");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameserver::testutil::gameserver;
    use crate::gameserver::GameServerState;
    use crate::stores::testutil::stores;

    #[test]
    fn test_desired_service_shape() {
        let gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        let svc = desired_service(&gs).unwrap();

        assert_eq!(svc.metadata.name.as_deref(), Some("game-1"));
        assert_eq!(svc.metadata.namespace.as_deref(), Some("lobby"));

        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(
            spec.selector.unwrap().get(GAMESERVER_LABEL).map(String::as_str),
            Some("game-1")
        );
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 7104);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(7104)));
    }

    #[test]
    fn test_desired_service_owner_reference() {
        let gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        let svc = desired_service(&gs).unwrap();

        let owners = svc.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "GameServer");
        assert_eq!(owners[0].name, "game-1");
    }

    #[test]
    fn test_desired_service_no_port() {
        let mut gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        gs.status.as_mut().unwrap().ports.clear();
        gs.spec.ports.clear();
        assert!(matches!(desired_service(&gs), Err(StepError::MissingPort)));
    }

    #[test]
    fn test_specs_match_ignores_cluster_fields() {
        let gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        let desired = desired_service(&gs).unwrap();

        let mut live = desired.clone();
        // Fields the API server fills in must not defeat the comparison.
        live.metadata.resource_version = Some("12345".to_string());
        live.spec.as_mut().unwrap().cluster_ip = Some("10.96.0.17".to_string());

        assert!(specs_match(&live, &desired));
    }

    #[test]
    fn test_specs_mismatch_on_port_change() {
        let gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        let desired = desired_service(&gs).unwrap();

        let mut live = desired.clone();
        live.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 9999;

        assert!(!specs_match(&live, &desired));
    }

    #[tokio::test]
    async fn test_reconcile_unchanged_makes_no_api_call() {
        // The mock client panics on any request; a cache hit must
        // return without touching it.
        let gs = gameserver("lobby", "game-1", Some(GameServerState::Ready), &[]);
        let mut live = desired_service(&gs).unwrap();
        live.metadata.resource_version = Some("7".to_string());

        let stores = stores(vec![live], vec![]);
        let reconciler =
            ServiceReconciler::new(crate::testutil::panicking_client(), stores.services);

        let result = reconciler.reconcile(&gs).await.unwrap();
        assert_eq!(result.metadata.name.as_deref(), Some("game-1"));
    }
}
