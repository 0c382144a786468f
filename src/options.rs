use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::LockError;

type WaitFn = dyn Fn(&mut dyn FnMut() -> Result<(), LockError>) -> Result<(), LockError>
    + Send
    + Sync;

/// Wait policy for blocking acquires.
///
/// Called when the first attempt inside [`Locker::lock`](crate::Locker::lock)
/// finds the lock taken. It receives `do_wait`, the blocking wait itself, and
/// decides how to run it: log around it, report progress, or refuse to wait
/// by returning an error without calling it.
///
/// ```
/// use reentrant_lock::{LockError, OnWait};
///
/// let announce = OnWait::new(|do_wait| {
///     eprintln!("waiting for lock...");
///     do_wait()
/// });
/// let never = OnWait::new(|_| Err(LockError::Cancelled("busy".into())));
/// # let _ = (announce, never);
/// ```
#[derive(Clone)]
pub struct OnWait(Arc<WaitFn>);

impl OnWait {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut dyn FnMut() -> Result<(), LockError>) -> Result<(), LockError>
            + Send
            + Sync
            + 'static,
    {
        OnWait(Arc::new(f))
    }

    pub fn call(&self, do_wait: &mut dyn FnMut() -> Result<(), LockError>) -> Result<(), LockError> {
        (self.0)(do_wait)
    }
}

impl fmt::Debug for OnWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnWait(..)")
    }
}

/// Options for a locker instance, fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct LockerOptions {
    /// Upper bound for a blocking acquire. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Acquire in shared mode instead of exclusive.
    pub read_only: bool,
    /// Policy run around the blocking wait.
    pub on_wait: Option<OnWait>,
}

impl LockerOptions {
    /// Exclusive mode, no timeout, no wait policy.
    pub fn exclusive() -> Self {
        Self::default()
    }

    /// Shared mode, no timeout, no wait policy.
    pub fn shared() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_on_wait(mut self, on_wait: OnWait) -> Self {
        self.on_wait = Some(on_wait);
        self
    }

    /// Run the blocking `acquire` through the wait policy, or directly when
    /// none is set.
    ///
    /// Succeeds only if `acquire` actually succeeded. A policy that returns
    /// `Ok` without waiting yields `Cancelled`; a policy that fails after a
    /// successful wait has the acquisition rolled back with `release`.
    pub(crate) fn wait(
        &self,
        name: &str,
        mut acquire: impl FnMut() -> Result<(), LockError>,
        release: impl FnOnce() -> Result<(), LockError>,
    ) -> Result<(), LockError> {
        let mut acquired = false;
        let mut do_wait = || -> Result<(), LockError> {
            if !acquired {
                acquire()?;
                acquired = true;
            }
            Ok(())
        };

        let result = match &self.on_wait {
            Some(on_wait) => on_wait.call(&mut do_wait),
            None => do_wait(),
        };

        match (result, acquired) {
            (Ok(()), true) => Ok(()),
            (Ok(()), false) => Err(LockError::Cancelled(name.to_string())),
            (Err(err), true) => {
                // the policy's error is what the caller sees
                let _ = release();
                Err(err)
            }
            (Err(err), false) => Err(err),
        }
    }
}

/// Serializable subset of [`LockerOptions`], for loading from config files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerConfig {
    pub timeout_ms: Option<u64>,
    pub read_only: bool,
}

impl LockerConfig {
    pub fn into_options(self) -> LockerOptions {
        LockerOptions {
            timeout: self.timeout_ms.map(Duration::from_millis),
            read_only: self.read_only,
            on_wait: None,
        }
    }
}

impl From<LockerConfig> for LockerOptions {
    fn from(config: LockerConfig) -> Self {
        config.into_options()
    }
}
