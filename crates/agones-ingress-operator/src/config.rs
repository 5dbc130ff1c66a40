//! Operator configuration
//!
//! CLI flags with environment fallbacks, plus the derived settings
//! struct threaded through the reconcilers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Parse a Go-style duration string ("15s", "3000ms") for clap.
fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

#[derive(Debug, Clone, Parser)]
#[command(name = "agones-ingress-operator", version, about = "Derives Services and Ingresses for annotated GameServers")]
pub struct Args {
    /// Path to a kubeconfig file; in-cluster config when omitted
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Interval between full relists of GameServers
    #[arg(long, env = "SYNC_PERIOD", default_value = "15s", value_parser = parse_duration)]
    pub sync_period: Duration,

    /// Listen address for the health probe server
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: SocketAddr,

    /// Base domain for derived ingress hostnames (<name>.<domain>)
    #[arg(long, env = "INGRESS_DOMAIN")]
    pub ingress_domain: String,

    /// ingressClassName set on derived Ingress objects
    #[arg(long, env = "INGRESS_CLASS", default_value = "nginx")]
    pub ingress_class: String,

    /// Enable debug logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
}

/// Settings the step reconcilers need.
#[derive(Debug, Clone)]
pub struct IngressSettings {
    /// Default base domain for derived FQDNs
    pub domain: String,
    /// ingressClassName for derived Ingresses
    pub ingress_class: String,
}

impl From<&Args> for IngressSettings {
    fn from(args: &Args) -> Self {
        Self {
            domain: args.ingress_domain.clone(),
            ingress_class: args.ingress_class.clone(),
        }
    }
}
