//! GameServer CRD types and the annotation policy
//!
//! The GameServer resource is owned by the external fleet manager
//! (Agones); this operator only reads it and writes back a couple of
//! annotations. The policy below is the synchronous admission filter
//! that keeps ineligible objects off the reconciliation pipeline.

use std::collections::BTreeMap;
use std::fmt;

use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use agones_ingress_common::annotations::{self, keys};

/// GameServer lifecycle states driven by the fleet manager.
///
/// Only a subset matters to this operator; the rest are carried so
/// that watch events for any state deserialize cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum GameServerState {
    PortAllocation,
    Creating,
    Starting,
    Scheduled,
    Requested,
    RequestReady,
    Ready,
    Allocated,
    Reserved,
    Shutdown,
    Error,
    Unhealthy,
}

impl fmt::Display for GameServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Port exposed by the game server container.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameServerPort {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub container_port: Option<i32>,
    #[serde(default)]
    pub host_port: Option<i32>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Port allocated to a running game server, reported in status.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameServerStatusPort {
    pub name: String,
    pub port: i32,
}

/// GameServer spec (the slice of the Agones schema this operator reads).
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "agones.dev",
    version = "v1",
    kind = "GameServer",
    plural = "gameservers",
    shortname = "gs",
    namespaced,
    status = "GameServerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GameServerSpec {
    /// Name of the game server container.
    #[serde(default)]
    pub container: Option<String>,
    /// Ports requested for the game server.
    #[serde(default)]
    pub ports: Vec<GameServerPort>,
}

/// GameServer status written by the fleet manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameServerStatus {
    #[serde(default)]
    pub state: Option<GameServerState>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub ports: Vec<GameServerStatusPort>,
}

/// Namespaced identity of a GameServer and its derived objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl GameServer {
    /// Current lifecycle state, if the fleet manager has set one.
    pub fn state(&self) -> Option<GameServerState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() == Some(GameServerState::Shutdown)
    }

    /// Namespaced identity. Objects delivered by a watch always carry
    /// name and namespace; defaults only show up in synthetic tests.
    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(
            self.meta().namespace.as_deref().unwrap_or("default"),
            self.meta().name.as_deref().unwrap_or(""),
        )
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().annotations.as_ref()
    }

    /// The allocated port to route traffic to: the first status port if
    /// the fleet manager has allocated one, else the first requested
    /// container port.
    pub fn allocated_port(&self) -> Option<i32> {
        self.status
            .as_ref()
            .and_then(|s| s.ports.first())
            .map(|p| p.port)
            .or_else(|| self.spec.ports.first().and_then(|p| p.container_port))
    }
}

/// Why a GameServer was not admitted to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The ingress-mode annotation is absent.
    MissingAnnotation,
    /// The GameServer is shutting down.
    Shutdown,
    /// The state is outside the reconcilable allow-list.
    State,
}

/// Admission decision for one GameServer snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Skip(SkipReason),
}

/// States that trigger reconciliation. Anything earlier is still
/// provisioning; anything later is allocated to players or tearing
/// down, and the exposure is already in place or no longer wanted.
fn state_allows_reconcile(state: Option<GameServerState>) -> bool {
    matches!(
        state,
        Some(GameServerState::Scheduled)
            | Some(GameServerState::RequestReady)
            | Some(GameServerState::Ready)
    )
}

/// Decide whether a GameServer snapshot is eligible for reconciliation.
///
/// Pure and total over the snapshot: no side effects, no access to
/// previous versions. Evaluated synchronously on the watch path, so it
/// must stay cheap.
pub fn admit(gs: &GameServer) -> Admission {
    if !annotations::has_flag(gs.annotations(), keys::INGRESS_MODE) {
        return Admission::Skip(SkipReason::MissingAnnotation);
    }

    if gs.is_shutdown() {
        return Admission::Skip(SkipReason::Shutdown);
    }

    if !state_allows_reconcile(gs.state()) {
        return Admission::Skip(SkipReason::State);
    }

    Admission::Admitted
}
