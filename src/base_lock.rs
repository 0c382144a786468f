use crate::{LockError, Locker};

/// Reentrant wrapper around a [`Locker`].
///
/// The first acquisition (`active_locks` 0 → 1) goes to the underlying
/// locker, every nested acquisition only bumps the counter. The underlying
/// lock is released when the outermost acquisition is released (1 → 0).
///
/// The counter is plain state behind `&mut self`: one `BaseLock` belongs to
/// one logical owner. Share it across threads only behind your own mutex.
///
/// ```
/// use reentrant_lock::{BaseLock, InMemoryLock, Locker};
///
/// let locker = InMemoryLock::new();
/// let mut lock = BaseLock::new("orders");
///
/// lock.lock(&locker)?;
/// lock.lock(&locker)?; // nested, no deadlock
/// assert!(!locker.try_lock()?);
///
/// lock.unlock(&locker)?;
/// lock.unlock(&locker)?;
/// assert!(locker.try_lock()?);
/// # locker.unlock()?;
/// # Ok::<(), reentrant_lock::LockError>(())
/// ```
#[derive(Debug)]
pub struct BaseLock {
    name: String,
    active_locks: usize,
}

impl BaseLock {
    /// Free wrapper for the resource called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        BaseLock {
            name: name.into(),
            active_locks: 0,
        }
    }

    /// Name of the protected resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of outstanding acquisitions.
    pub fn active_locks(&self) -> usize {
        self.active_locks
    }

    /// Whether the underlying lock is currently held through this wrapper.
    pub fn is_held(&self) -> bool {
        self.active_locks > 0
    }

    /// Try to acquire without blocking.
    ///
    /// Returns `Ok(true)` immediately when already held; otherwise asks the
    /// locker and only counts the acquisition if it succeeded.
    pub fn try_lock<L: Locker + ?Sized>(&mut self, locker: &L) -> Result<bool, LockError> {
        if self.active_locks > 0 {
            self.active_locks += 1;
            tracing::trace!(lock = %self.name, active = self.active_locks, "reentrant try_lock");
            return Ok(true);
        }

        let locked = locker.try_lock()?;
        if locked {
            self.active_locks = 1;
            tracing::trace!(lock = %self.name, "acquired");
        }
        Ok(locked)
    }

    /// Acquire, blocking in the locker on the first acquisition only.
    pub fn lock<L: Locker + ?Sized>(&mut self, locker: &L) -> Result<(), LockError> {
        if self.active_locks == 0 {
            locker.lock()?;
            tracing::trace!(lock = %self.name, "acquired");
        }

        self.active_locks += 1;
        tracing::trace!(lock = %self.name, active = self.active_locks, "lock");
        Ok(())
    }

    /// Release one acquisition.
    ///
    /// The last release unlocks the underlying locker and returns its result;
    /// the wrapper is `Free` afterwards either way. Releasing a free wrapper
    /// is a no-op.
    pub fn unlock<L: Locker + ?Sized>(&mut self, locker: &L) -> Result<(), LockError> {
        if self.active_locks == 0 {
            tracing::warn!(lock = %self.name, "unlock called on a lock that is not held");
            return Ok(());
        }

        self.active_locks -= 1;
        tracing::trace!(lock = %self.name, active = self.active_locks, "unlock");

        if self.active_locks == 0 {
            tracing::trace!(lock = %self.name, "released");
            return locker.unlock();
        }

        Ok(())
    }

    /// Run `f` while holding the lock.
    ///
    /// `f` gets the wrapper back so nested code can take the same lock again.
    /// The lock is released on every exit path, including a panic in `f`.
    /// An error from `f` takes precedence over a release error.
    pub fn with_lock<L, T, E, F>(&mut self, locker: &L, f: F) -> Result<T, E>
    where
        L: Locker + ?Sized,
        E: From<LockError>,
        F: FnOnce(&mut BaseLock) -> Result<T, E>,
    {
        self.lock(locker)?;

        let mut guard = ReleaseGuard {
            lock: self,
            locker,
            armed: true,
        };
        let result = f(&mut *guard.lock);
        let released = guard.release();

        match (result, released) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(E::from(err)),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

impl Drop for BaseLock {
    fn drop(&mut self) {
        if self.active_locks > 0 {
            tracing::warn!(
                lock = %self.name,
                active = self.active_locks,
                "lock dropped with unreleased acquisitions"
            );
        }
    }
}

/// Releases one acquisition when dropped unless already released.
struct ReleaseGuard<'a, L: Locker + ?Sized> {
    lock: &'a mut BaseLock,
    locker: &'a L,
    armed: bool,
}

impl<L: Locker + ?Sized> ReleaseGuard<'_, L> {
    fn release(&mut self) -> Result<(), LockError> {
        self.armed = false;
        self.lock.unlock(self.locker)
    }
}

impl<L: Locker + ?Sized> Drop for ReleaseGuard<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            // Unwinding out of the closure; the panic is what the caller sees.
            let _ = self.lock.unlock(self.locker);
        }
    }
}
