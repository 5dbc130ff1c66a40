//! GameServer write-back step
//!
//! Records the exposure outcome on the GameServer itself: the
//! `ingress-ready` marker and the FQDN traffic should use. Written
//! with a merge patch on annotations, and skipped entirely when the
//! snapshot already carries the right values.

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::{debug, info, instrument};

use agones_ingress_common::annotations::{self, keys};

use crate::config::IngressSettings;
use crate::gameserver::GameServer;

use super::{ingress::fqdn, ReconcileStatus, StepError};

pub struct StatusReconciler {
    client: Client,
    settings: IngressSettings,
}

impl StatusReconciler {
    pub fn new(client: Client, settings: IngressSettings) -> Self {
        Self { client, settings }
    }
}

/// Whether the snapshot already carries the desired write-back values.
fn up_to_date(gs: &GameServer, fqdn: &str) -> bool {
    annotations::get(gs.annotations(), keys::INGRESS_READY) == Some("true")
        && annotations::get(gs.annotations(), keys::FQDN) == Some(fqdn)
}

#[async_trait]
impl ReconcileStatus for StatusReconciler {
    #[instrument(skip(self, gs), fields(gameserver = %gs.namespaced_name()))]
    async fn reconcile(&self, gs: &GameServer) -> Result<GameServer, StepError> {
        let id = gs.namespaced_name();
        let fqdn = fqdn(gs, &self.settings)?;

        if up_to_date(gs, &fqdn) {
            debug!("GameServer annotations up to date");
            return Ok(gs.clone());
        }

        let patch = json!({
            "metadata": {
                "annotations": {
                    keys::INGRESS_READY: "true",
                    keys::FQDN: fqdn,
                }
            }
        });

        let api: Api<GameServer> = Api::namespaced(self.client.clone(), &id.namespace);
        let patched = api
            .patch(&id.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(fqdn = %fqdn, "Updated gameserver annotations");
        Ok(patched)
    }
}
