//! Kubernetes operator deriving network exposure for GameServers
//!
//! Watches externally-managed GameServer custom resources and, for
//! objects that opt in via annotation, derives a ClusterIP Service, an
//! Ingress routing the server's FQDN to it, and an annotation
//! write-back marking the exposure ready.

pub mod config;
pub mod gameserver;
pub mod handler;
pub mod health;
pub mod pipeline;
pub mod reconcilers;
pub mod retry;
pub mod singleflight;
pub mod stores;
pub mod watch;

#[cfg(test)]
pub(crate) mod testutil;
