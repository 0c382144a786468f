//! Test doubles for the `Locker` capability.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use reentrant_lock::{LockError, Locker};

/// Install a `tracing` subscriber once so `RUST_LOG=trace` shows lock transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Locker that counts calls and plays back scripted results.
///
/// Each operation pops its next scripted result; when the script is empty
/// the operation succeeds (`try_lock` returns `Ok(true)`).
#[derive(Default)]
pub struct ScriptedLocker {
    try_lock_calls: AtomicUsize,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
    try_lock_results: Mutex<VecDeque<Result<bool, LockError>>>,
    lock_results: Mutex<VecDeque<Result<(), LockError>>>,
    unlock_results: Mutex<VecDeque<Result<(), LockError>>>,
}

impl ScriptedLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_try_lock(self, result: Result<bool, LockError>) -> Self {
        self.try_lock_results.lock().unwrap().push_back(result);
        self
    }

    pub fn then_lock(self, result: Result<(), LockError>) -> Self {
        self.lock_results.lock().unwrap().push_back(result);
        self
    }

    pub fn then_unlock(self, result: Result<(), LockError>) -> Self {
        self.unlock_results.lock().unwrap().push_back(result);
        self
    }

    pub fn try_lock_calls(&self) -> usize {
        self.try_lock_calls.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    /// Calls that could have acquired the underlying lock.
    pub fn acquire_calls(&self) -> usize {
        self.try_lock_calls() + self.lock_calls()
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::SeqCst)
    }
}

impl Locker for ScriptedLocker {
    fn try_lock(&self) -> Result<bool, LockError> {
        self.try_lock_calls.fetch_add(1, Ordering::SeqCst);
        self.try_lock_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(true))
    }

    fn lock(&self) -> Result<(), LockError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.lock_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn unlock(&self) -> Result<(), LockError> {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        self.unlock_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
