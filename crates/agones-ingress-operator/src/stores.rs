//! Cached read paths for derived objects
//!
//! The step reconcilers compare desired state against reflector caches
//! before writing, so steady-state reconciliations make no API calls.
//! Writes always go through the API server.

use std::fmt::Debug;
use std::hash::Hash;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::{self, Lookup, Store};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Reflector caches for the object kinds this operator derives.
#[derive(Clone)]
pub struct Stores {
    pub services: Store<Service>,
    pub ingresses: Store<Ingress>,
}

impl Stores {
    /// Start reflectors for Services and Ingresses on `tracker` and
    /// return their read handles.
    pub fn spawn(client: &Client, tracker: &TaskTracker) -> Self {
        Self {
            services: spawn_reflector(Api::all(client.clone()), tracker),
            ingresses: spawn_reflector(Api::all(client.clone()), tracker),
        }
    }

    /// Block until both caches have completed their initial list.
    pub async fn wait_ready(&self) {
        self.services.wait_until_ready().await.ok();
        self.ingresses.wait_until_ready().await.ok();
    }
}

fn spawn_reflector<K>(api: Api<K>, tracker: &TaskTracker) -> Store<K>
where
    K: Resource + Lookup + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    <K as Resource>::DynamicType: Default,
    <K as Lookup>::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    let (reader, writer) = reflector::store();
    let kind = <K as Resource>::kind(&Default::default()).to_string();

    tracker.spawn(async move {
        let stream = reflector::reflector(writer, watcher(api, watcher::Config::default()))
            .default_backoff();
        let mut stream = std::pin::pin!(stream);
        while let Some(event) = stream.next().await {
            if let Err(error) = event {
                warn!(kind = %kind, error = %error, "Reflector stream error");
            }
        }
    });

    reader
}
