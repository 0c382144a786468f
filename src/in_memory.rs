use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use crate::{LockError, LockManager, Locker, LockerOptions};

#[derive(Debug, Default)]
struct State {
    writer: bool,
    readers: usize,
}

impl State {
    fn is_free_for(&self, read_only: bool) -> bool {
        if read_only {
            !self.writer
        } else {
            !self.writer && self.readers == 0
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

fn poisoned<T>(err: PoisonError<T>) -> LockError {
    LockError::Poisoned(err.to_string())
}

/// In-process lock backed by `Mutex` + `Condvar`.
///
/// Supports exclusive and shared (`read_only`) acquisition. Each value is one
/// handle; [`InMemoryLock::handle`] makes another handle on the same state, so
/// a reader and a writer can contend for one resource with their own options.
/// Dropping a handle that still holds the lock releases it.
#[derive(Debug)]
pub struct InMemoryLock {
    name: String,
    shared: Arc<Shared>,
    options: LockerOptions,
    held: AtomicBool,
}

impl InMemoryLock {
    /// Exclusive lock named `in-memory`.
    pub fn new() -> Self {
        Self::with_options("in-memory", LockerOptions::default())
    }

    /// Lock with its own fresh state; `name` appears in timeout errors.
    pub fn with_options(name: impl Into<String>, options: LockerOptions) -> Self {
        InMemoryLock {
            name: name.into(),
            shared: Arc::new(Shared::default()),
            options,
            held: AtomicBool::new(false),
        }
    }

    /// A new, unheld handle on the same underlying lock.
    pub fn handle(&self, options: LockerOptions) -> Self {
        InMemoryLock {
            name: self.name.clone(),
            shared: self.shared.clone(),
            options,
            held: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &LockerOptions {
        &self.options
    }

    fn acquire(&self, state: &mut State) {
        if self.options.read_only {
            state.readers += 1;
        } else {
            state.writer = true;
        }
        self.held.store(true, Ordering::SeqCst);
    }

    fn can_acquire(&self, state: &State) -> bool {
        !self.held.load(Ordering::SeqCst) && state.is_free_for(self.options.read_only)
    }

    fn wait_and_acquire(&self) -> Result<(), LockError> {
        let started = Instant::now();
        let deadline = self.options.timeout.map(|timeout| started + timeout);

        let mut state = self.shared.state.lock().map_err(poisoned)?;
        while !self.can_acquire(&state) {
            state = match deadline {
                None => self.shared.wake.wait(state).map_err(poisoned)?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::Timeout {
                            name: self.name.clone(),
                            waited: now - started,
                        });
                    }
                    self.shared
                        .wake
                        .wait_timeout(state, deadline - now)
                        .map_err(poisoned)?
                        .0
                }
            };
        }
        self.acquire(&mut state);
        Ok(())
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Locker for InMemoryLock {
    fn try_lock(&self) -> Result<bool, LockError> {
        let mut state = self.shared.state.lock().map_err(poisoned)?;
        if self.can_acquire(&state) {
            self.acquire(&mut state);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn lock(&self) -> Result<(), LockError> {
        if self.try_lock()? {
            return Ok(());
        }

        tracing::debug!(lock = %self.name, read_only = self.options.read_only, "waiting for lock");
        self.options
            .wait(&self.name, || self.wait_and_acquire(), || self.unlock())
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut state = self.shared.state.lock().map_err(poisoned)?;
        if self.held.swap(false, Ordering::SeqCst) {
            if self.options.read_only {
                state.readers = state.readers.saturating_sub(1);
            } else {
                state.writer = false;
            }
            self.shared.wake.notify_all();
        }
        Ok(())
    }
}

impl Drop for InMemoryLock {
    fn drop(&mut self) {
        // a dropped handle must not keep the shared state locked
        if self.held.load(Ordering::SeqCst) {
            let _ = self.unlock();
        }
    }
}

/// In-memory lock manager backed by a `HashMap<String, InMemoryLock>`.
///
/// Lazily creates one `InMemoryLock` per unique name and hands out a fresh
/// handle on it for every lookup, so each owner tracks its own acquisition
/// (several readers can hold a shared lock at once). Handles get the
/// manager's options.
#[derive(Debug, Default)]
pub struct InMemoryLockManager {
    options: LockerOptions,
    locks: Mutex<HashMap<String, InMemoryLock>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager whose handles use `options`.
    pub fn with_options(options: LockerOptions) -> Self {
        InMemoryLockManager {
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl LockManager for InMemoryLockManager {
    type Lock = InMemoryLock;

    fn get_lock(&self, name: &str) -> Result<Arc<InMemoryLock>, LockError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LockError::Poisoned("lock manager map poisoned".into()))?;
        let lock = locks
            .entry(name.to_string())
            .or_insert_with(|| InMemoryLock::with_options(name, self.options.clone()));
        Ok(Arc::new(lock.handle(self.options.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OnWait;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    // ========================================================================
    // InMemoryLock tests
    // ========================================================================

    #[test]
    fn test_lock_new() {
        let lock = InMemoryLock::new();
        assert!(lock.try_lock().unwrap()); // unlocked by default
        lock.unlock().unwrap();
    }

    #[test]
    fn test_lock_lock() {
        let lock = InMemoryLock::new();
        lock.lock().unwrap();
        assert!(!lock.try_lock().unwrap()); // not reentrant
        assert!(!lock.handle(LockerOptions::exclusive()).try_lock().unwrap());
        lock.unlock().unwrap();
    }

    #[test]
    fn test_lock_unlock() {
        let lock = InMemoryLock::new();
        lock.lock().unwrap();
        lock.unlock().unwrap();
        assert!(lock.try_lock().unwrap()); // can lock again after unlock
        lock.unlock().unwrap();
    }

    #[test]
    fn unlock_when_not_held_is_noop() {
        let lock = InMemoryLock::new();
        let other = lock.handle(LockerOptions::exclusive());
        other.lock().unwrap();

        lock.unlock().unwrap();
        assert!(!lock.try_lock().unwrap());
        other.unlock().unwrap();
    }

    #[test]
    fn shared_handles_coexist() {
        let lock = InMemoryLock::with_options("cache", LockerOptions::shared());
        let reader = lock.handle(LockerOptions::shared());
        let writer = lock.handle(LockerOptions::exclusive());

        assert!(lock.try_lock().unwrap());
        assert!(reader.try_lock().unwrap());
        assert!(!writer.try_lock().unwrap());

        lock.unlock().unwrap();
        assert!(!writer.try_lock().unwrap());
        reader.unlock().unwrap();
        assert!(writer.try_lock().unwrap());
        assert!(!lock.try_lock().unwrap());
        writer.unlock().unwrap();
    }

    #[test]
    fn lock_times_out_while_held() {
        let holder = InMemoryLock::with_options("jobs", LockerOptions::exclusive());
        let waiter = holder.handle(LockerOptions::exclusive().with_timeout(Duration::from_millis(20)));

        holder.lock().unwrap();
        match waiter.lock() {
            Err(LockError::Timeout { name, waited }) => {
                assert_eq!(name, "jobs");
                assert!(waited >= Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        holder.unlock().unwrap();
        waiter.lock().unwrap();
        waiter.unlock().unwrap();
    }

    #[test]
    fn lock_blocks_until_released() {
        let holder = Arc::new(InMemoryLock::new());
        holder.lock().unwrap();

        let waiter = holder.handle(LockerOptions::exclusive());
        let releaser = holder.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            releaser.unlock().unwrap();
        });

        waiter.lock().unwrap();
        handle.join().unwrap();
        assert!(!holder.try_lock().unwrap());
        waiter.unlock().unwrap();
    }

    #[test]
    fn on_wait_runs_only_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let options = LockerOptions::exclusive()
            .with_timeout(Duration::from_millis(10))
            .with_on_wait(OnWait::new(move |do_wait| {
                seen.fetch_add(1, Ordering::SeqCst);
                do_wait()
            }));

        let lock = InMemoryLock::with_options("jobs", options.clone());
        lock.lock().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let contender = lock.handle(options);
        assert!(matches!(contender.lock(), Err(LockError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        lock.unlock().unwrap();
    }

    // ========================================================================
    // InMemoryLockManager tests
    // ========================================================================

    #[test]
    fn same_name_shares_the_lock() {
        let manager = InMemoryLockManager::new();
        let lock1 = manager.get_lock("entity-1").unwrap();
        let lock2 = manager.get_lock("entity-1").unwrap();
        assert_eq!(lock1.name(), "entity-1");

        assert!(lock1.try_lock().unwrap());
        assert!(!lock2.try_lock().unwrap());
        lock1.unlock().unwrap();
        assert!(lock2.try_lock().unwrap());
        lock2.unlock().unwrap();
    }

    #[test]
    fn different_name_is_independent() {
        let manager = InMemoryLockManager::new();
        let lock1 = manager.get_lock("entity-1").unwrap();
        let lock2 = manager.get_lock("entity-2").unwrap();
        assert!(lock1.try_lock().unwrap());
        assert!(lock2.try_lock().unwrap());
        lock1.unlock().unwrap();
        lock2.unlock().unwrap();
    }

    #[test]
    fn manager_readers_hold_shared_lock_together() {
        let manager = InMemoryLockManager::with_options(LockerOptions::shared());
        let reader_a = manager.get_lock("cache").unwrap();
        let reader_b = manager.get_lock("cache").unwrap();
        assert!(reader_a.options().read_only);

        assert!(reader_a.try_lock().unwrap());
        assert!(reader_b.try_lock().unwrap());

        let writer = reader_a.handle(LockerOptions::exclusive());
        assert!(!writer.try_lock().unwrap());
        reader_a.unlock().unwrap();
        reader_b.unlock().unwrap();
        assert!(writer.try_lock().unwrap());
        writer.unlock().unwrap();
    }

    #[test]
    fn dropping_held_handle_releases() {
        let lock = InMemoryLock::new();
        let reader = lock.handle(LockerOptions::shared());
        assert!(reader.try_lock().unwrap());
        drop(reader);
        assert!(lock.try_lock().unwrap());
        lock.unlock().unwrap();
    }

    #[test]
    fn policy_returning_early_does_not_acquire() {
        let holder = InMemoryLock::new();
        holder.lock().unwrap();

        let skipper =
            holder.handle(LockerOptions::exclusive().with_on_wait(OnWait::new(|_| Ok(()))));
        assert_eq!(
            skipper.lock(),
            Err(LockError::Cancelled("in-memory".into()))
        );
        assert!(!skipper.held.load(Ordering::SeqCst));

        holder.unlock().unwrap();
        assert!(skipper.try_lock().unwrap());
        skipper.unlock().unwrap();
    }
}
