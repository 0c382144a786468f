//! Reentrant locking on top of any non-reentrant lock.
//!
//! [`BaseLock`] counts acquisitions by one logical owner and only touches the
//! underlying [`Locker`] on the outermost lock and unlock, so nested calls can
//! each take the lock on a resource without knowing whether a caller already
//! holds it.
//!
//! ```
//! use reentrant_lock::{BaseLock, InMemoryLockManager, LockError, LockManager, Locker};
//!
//! fn save(lock: &mut BaseLock, locker: &impl Locker) -> Result<(), LockError> {
//!     lock.with_lock(locker, |_| Ok(()))
//! }
//!
//! let manager = InMemoryLockManager::new();
//! let locker = manager.get_lock("orders")?;
//! let mut lock = BaseLock::new("orders");
//!
//! let total = lock.with_lock(&*locker, |lock| {
//!     // already held by us: nested acquisition does not deadlock
//!     save(lock, &*locker)?;
//!     Ok::<_, LockError>(42)
//! })?;
//! assert_eq!(total, 42);
//! assert!(!lock.is_held());
//! # Ok::<(), LockError>(())
//! ```

mod base_lock;
mod error;
mod file;
mod in_memory;
mod lock_manager;
mod locker;
mod options;

pub use base_lock::BaseLock;
pub use error::LockError;
pub use file::{FileLock, FileLockManager};
pub use in_memory::{InMemoryLock, InMemoryLockManager};
pub use lock_manager::LockManager;
pub use locker::Locker;
pub use options::{LockerConfig, LockerOptions, OnWait};
