//! Ingress step
//!
//! Derives one Ingress per GameServer routing `<name>.<domain>` to the
//! derived Service. The domain comes from the per-object annotation
//! when present, else the operator default. Reports whether this run
//! changed the cluster so the pipeline can log accordingly.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client};
use tracing::{debug, info, instrument};

use agones_ingress_common::annotations::{self, keys};
use agones_ingress_common::validation::validate_hostname;

use crate::config::IngressSettings;
use crate::gameserver::GameServer;

use super::{owner_reference, IngressOutcome, ReconcileIngress, StepError, FIELD_MANAGER, GAMESERVER_LABEL};

pub struct IngressReconciler {
    client: Client,
    store: Store<Ingress>,
    settings: IngressSettings,
}

impl IngressReconciler {
    pub fn new(client: Client, store: Store<Ingress>, settings: IngressSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }
}

/// FQDN for a GameServer: `<name>.<domain>`, with the domain taken
/// from the annotation override when set.
pub(crate) fn fqdn(gs: &GameServer, settings: &IngressSettings) -> Result<String, StepError> {
    let domain = annotations::get(gs.annotations(), keys::DOMAIN)
        .filter(|d| !d.is_empty())
        .unwrap_or(&settings.domain);
    let fqdn = format!("{}.{}", gs.namespaced_name().name, domain);
    Ok(validate_hostname(&fqdn)?)
}

/// Build the desired Ingress for a GameServer.
pub(crate) fn desired_ingress(
    gs: &GameServer,
    settings: &IngressSettings,
) -> Result<Ingress, StepError> {
    let id = gs.namespaced_name();
    let host = fqdn(gs, settings)?;
    let port = gs.allocated_port().ok_or(StepError::MissingPort)?;

    let labels: BTreeMap<String, String> = [
        ("app.kubernetes.io/managed-by".to_string(), FIELD_MANAGER.to_string()),
        (GAMESERVER_LABEL.to_string(), id.name.clone()),
    ]
    .into();

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(id.name.clone()),
            namespace: Some(id.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(gs)?]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(settings.ingress_class.clone()),
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: id.name,
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    name: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Whether the cached Ingress already matches the desired spec.
fn specs_match(existing: &Ingress, desired: &Ingress) -> bool {
    match (&existing.spec, &desired.spec) {
        (Some(e), Some(d)) => e.ingress_class_name == d.ingress_class_name && e.rules == d.rules,
        _ => false,
    }
}

#[async_trait]
impl ReconcileIngress for IngressReconciler {
    #[instrument(skip(self, gs), fields(gameserver = %gs.namespaced_name()))]
    async fn reconcile(&self, gs: &GameServer) -> Result<IngressOutcome, StepError> {
        let id = gs.namespaced_name();
        let desired = desired_ingress(gs, &self.settings)?;

        let cached = self
            .store
            .get(&ObjectRef::new(&id.name).within(&id.namespace));
        if let Some(existing) = cached {
            if specs_match(&existing, &desired) {
                debug!("Ingress up to date");
                return Ok(IngressOutcome {
                    ingress: Arc::unwrap_or_clone(existing),
                    changed: false,
                });
            }
        }

        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &id.namespace);
        let applied = api
            .patch(
                &id.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&desired),
            )
            .await?;

        info!(ingress = %id.name, "Applied ingress");
        Ok(IngressOutcome {
            ingress: applied,
            changed: true,
        })
    }
}
