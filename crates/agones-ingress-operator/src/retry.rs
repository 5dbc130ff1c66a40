//! Retry policy with exponential backoff for pipeline errors
//!
//! Errors are classified as transient or permanent; transient errors
//! are retried in-task with bounded exponential backoff, after which
//! the periodic relist picks the object up again.

use std::time::Duration;

use tracing::{debug, warn};

/// Maximum number of attempts before giving up on a snapshot
pub const MAX_RETRIES: u32 = 5;

/// Base delay for exponential backoff (seconds)
const BASE_DELAY_SECS: u64 = 5;

/// Maximum delay between retries (5 minutes)
const MAX_DELAY_SECS: u64 = 300;

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient errors that should be retried with backoff
    /// Examples: network issues, conflicts, rate limiting
    Transient,
    /// Permanent errors that will not recover without a new snapshot
    /// Examples: malformed annotations, invalid configuration
    Permanent,
}

/// Determine the delay before the next attempt, or `None` to stop.
///
/// `attempt` is the number of attempts already made (1-based).
pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Option<Duration> {
    match kind {
        ErrorKind::Transient => {
            if attempt >= MAX_RETRIES {
                warn!(
                    attempt,
                    max_retries = MAX_RETRIES,
                    "Max retries exceeded, waiting for resource change"
                );
                None
            } else {
                // Exponential backoff: 5s, 10s, 20s, 40s, capped at 5 minutes
                let delay_secs = BASE_DELAY_SECS * 2u64.pow(attempt.saturating_sub(1));
                let capped_delay = delay_secs.min(MAX_DELAY_SECS);
                debug!(
                    attempt,
                    delay_secs = capped_delay,
                    "Scheduling retry with exponential backoff"
                );
                Some(Duration::from_secs(capped_delay))
            }
        }
        ErrorKind::Permanent => {
            // No point retrying the same snapshot
            warn!("Permanent error, waiting for resource change");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_backoff_transient_progression() {
        assert_eq!(
            compute_backoff(1, ErrorKind::Transient),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            compute_backoff(2, ErrorKind::Transient),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            compute_backoff(3, ErrorKind::Transient),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            compute_backoff(4, ErrorKind::Transient),
            Some(Duration::from_secs(40))
        );
    }

    #[test]
    fn test_compute_backoff_max_retries() {
        assert_eq!(compute_backoff(MAX_RETRIES, ErrorKind::Transient), None);
        assert_eq!(compute_backoff(MAX_RETRIES + 1, ErrorKind::Transient), None);
    }

    #[test]
    fn test_compute_backoff_never_exceeds_cap() {
        for attempt in 1..MAX_RETRIES {
            let delay = compute_backoff(attempt, ErrorKind::Transient).unwrap();
            assert!(delay <= Duration::from_secs(MAX_DELAY_SECS));
        }
    }

    #[test]
    fn test_compute_backoff_permanent() {
        assert_eq!(compute_backoff(1, ErrorKind::Permanent), None);
    }
}
