use std::sync::Arc;

use crate::LockError;

/// A non-reentrant lock capability.
///
/// Implementations provide blocking lock, non-blocking try-lock, and unlock.
/// In-memory locks use `Mutex` + `Condvar`; file locks use advisory OS locks;
/// distributed locks might use Redis, Postgres advisory locks, etcd leases, etc.
///
/// A `Locker` is not reentrant: calling `lock` twice on the same instance
/// without an `unlock` in between deadlocks or times out. Wrap it in a
/// [`BaseLock`](crate::BaseLock) to get reentrancy.
pub trait Locker: Send + Sync {
    /// Try to acquire the lock without blocking.
    /// Returns `Ok(true)` if acquired, `Ok(false)` if already held elsewhere.
    fn try_lock(&self) -> Result<bool, LockError>;

    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError>;

    /// Release a lock previously acquired through this instance.
    fn unlock(&self) -> Result<(), LockError>;
}

impl<L: Locker + ?Sized> Locker for &L {
    fn try_lock(&self) -> Result<bool, LockError> {
        (**self).try_lock()
    }

    fn lock(&self) -> Result<(), LockError> {
        (**self).lock()
    }

    fn unlock(&self) -> Result<(), LockError> {
        (**self).unlock()
    }
}

impl<L: Locker + ?Sized> Locker for Box<L> {
    fn try_lock(&self) -> Result<bool, LockError> {
        (**self).try_lock()
    }

    fn lock(&self) -> Result<(), LockError> {
        (**self).lock()
    }

    fn unlock(&self) -> Result<(), LockError> {
        (**self).unlock()
    }
}

impl<L: Locker + ?Sized> Locker for Arc<L> {
    fn try_lock(&self) -> Result<bool, LockError> {
        (**self).try_lock()
    }

    fn lock(&self) -> Result<(), LockError> {
        (**self).lock()
    }

    fn unlock(&self) -> Result<(), LockError> {
        (**self).unlock()
    }
}
