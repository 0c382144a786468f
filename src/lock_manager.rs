use std::sync::Arc;

use crate::{LockError, Locker};

/// Factory trait for obtaining per-resource lockers by name.
///
/// The default `InMemoryLockManager` stores locks in a `HashMap`;
/// `FileLockManager` maps names to lock files under a directory.
/// Distributed implementations might talk to Redis, Postgres, etc.
///
/// Handles are non-reentrant. Each logical owner takes one handle and pairs
/// it with its own [`BaseLock`](crate::BaseLock) for reentrancy.
pub trait LockManager: Send + Sync {
    /// The concrete lock type returned by this manager.
    type Lock: Locker;

    /// Get a handle on the lock for the given name.
    ///
    /// Repeated calls with the same `name` must return handles on the same
    /// logical lock (the same in-memory state, or the same lock file). Each
    /// call returns a separate, unheld handle, so every owner acquires and
    /// releases through its own.
    fn get_lock(&self, name: &str) -> Result<Arc<Self::Lock>, LockError>;
}
