use std::time::Duration;

use thiserror::Error;

/// Error type for lock operations.
///
/// Variants carry plain strings so the error stays `Clone` and comparable,
/// which lets test doubles script exact failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The underlying lock primitive was poisoned (e.g. a thread panicked while holding it).
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// Failed to acquire the lock.
    #[error("lock acquire failed: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("lock release failed: {0}")]
    ReleaseFailed(String),

    /// A blocking acquire gave up after the configured timeout.
    #[error("timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },

    /// A wait policy aborted the blocking acquire.
    #[error("wait for lock {0} cancelled")]
    Cancelled(String),

    /// Any other lock error.
    #[error("lock error: {0}")]
    Other(String),
}
