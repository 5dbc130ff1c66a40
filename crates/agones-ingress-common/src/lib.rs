//! agones-ingress-common: shared helpers for the agones-ingress operator

pub mod annotations;
pub mod validation;

pub use annotations::{has_flag, try_get_duration, DurationError};
pub use validation::{validate_hostname, ValidationError, ValidationResult};
