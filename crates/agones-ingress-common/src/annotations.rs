//! Annotation keys and typed accessors
//!
//! GameServers opt into ingress exposure through annotations set by the
//! fleet manager or the operator of the fleet. All lookups go through
//! the typed accessors below instead of raw map access so that the
//! distinction between "absent" and "malformed" is explicit.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Annotation keys consumed by the operator.
pub mod keys {
    /// Presence gates reconciliation entirely; the value is ignored.
    pub const INGRESS_MODE: &str = "agones-ingress.io/ingress-mode";
    /// Duration string (e.g. "3000ms") to wait between the Service and
    /// Ingress steps.
    pub const INGRESS_DELAY: &str = "agones-ingress.io/ingress-delay";
    /// Per-object override of the ingress domain.
    pub const DOMAIN: &str = "agones-ingress.io/domain";
    /// Written back by the status reconciler once Service and Ingress exist.
    pub const INGRESS_READY: &str = "agones-ingress.io/ingress-ready";
    /// Written back by the status reconciler: the routable FQDN.
    pub const FQDN: &str = "agones-ingress.io/fqdn";
}

#[derive(Debug, Error)]
pub enum DurationError {
    #[error("invalid duration {value:?} (example: \"3000ms\"): {source}")]
    Invalid {
        value: String,
        source: humantime::DurationError,
    },
}

/// True if the annotation key is present, regardless of its value.
pub fn has_flag(annotations: Option<&BTreeMap<String, String>>, key: &str) -> bool {
    annotations.is_some_and(|a| a.contains_key(key))
}

/// Value of an annotation, if present.
pub fn get<'a>(annotations: Option<&'a BTreeMap<String, String>>, key: &str) -> Option<&'a str> {
    annotations.and_then(|a| a.get(key)).map(String::as_str)
}

/// Parse an annotation as a duration.
///
/// Returns `None` when the key is absent; `Some(Err(_))` when the key is
/// present but the value does not parse. Callers must not conflate the
/// two: a missing delay means "no delay", a malformed one is an error.
pub fn try_get_duration(
    annotations: Option<&BTreeMap<String, String>>,
    key: &str,
) -> Option<Result<Duration, DurationError>> {
    let value = get(annotations, key)?;
    Some(
        humantime::parse_duration(value).map_err(|source| DurationError::Invalid {
            value: value.to_string(),
            source,
        }),
    )
}
