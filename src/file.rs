use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::{LockError, LockManager, Locker, LockerOptions};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

fn poisoned<T>(err: PoisonError<T>) -> LockError {
    LockError::Poisoned(err.to_string())
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Advisory OS file lock (`flock` on Unix, `LockFileEx` on Windows).
///
/// The lock file is created on first acquisition and left in place; only
/// the OS lock on the open handle carries state. Blocking acquires poll
/// with exponential backoff so timeouts and wait policies apply.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    options: LockerOptions,
    file: Mutex<Option<File>>,
}

impl FileLock {
    /// Exclusive lock on `path`, no timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, LockerOptions::default())
    }

    /// Lock on `path` with the given mode, timeout and wait policy.
    pub fn with_options(path: impl Into<PathBuf>, options: LockerOptions) -> Self {
        FileLock {
            path: path.into(),
            options,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
    }

    fn poll_until_locked(&self) -> Result<(), LockError> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if self.try_lock()? {
                return Ok(());
            }

            let mut sleep = backoff;
            if let Some(timeout) = self.options.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(LockError::Timeout {
                        name: self.path.display().to_string(),
                        waited,
                    });
                }
                sleep = sleep.min(timeout - waited);
            }

            thread::sleep(sleep);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

impl Locker for FileLock {
    fn try_lock(&self) -> Result<bool, LockError> {
        let mut held = self.file.lock().map_err(poisoned)?;
        if held.is_some() {
            return Ok(false);
        }

        let file = self.open().map_err(|e| {
            LockError::AcquireFailed(format!("open {}: {}", self.path.display(), e))
        })?;
        let attempt = if self.options.read_only {
            FileExt::try_lock_shared(&file)
        } else {
            FileExt::try_lock_exclusive(&file)
        };

        match attempt {
            Ok(()) => {
                *held = Some(file);
                Ok(true)
            }
            Err(err) if is_contended(&err) => Ok(false),
            Err(err) => Err(LockError::AcquireFailed(format!(
                "lock {}: {}",
                self.path.display(),
                err
            ))),
        }
    }

    fn lock(&self) -> Result<(), LockError> {
        if self.try_lock()? {
            return Ok(());
        }

        tracing::debug!(path = %self.path.display(), read_only = self.options.read_only, "waiting for file lock");
        let name = self.path.display().to_string();
        self.options
            .wait(&name, || self.poll_until_locked(), || self.unlock())
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut held = self.file.lock().map_err(poisoned)?;
        let Some(file) = held.take() else {
            return Ok(());
        };

        // Closing the handle would drop the lock too; unlock explicitly to surface errors.
        FileExt::unlock(&file).map_err(|e| {
            LockError::ReleaseFailed(format!("unlock {}: {}", self.path.display(), e))
        })
    }
}

/// File lock manager: lock files for names under a directory.
///
/// Every lookup opens a fresh `FileLock` handle, so each owner holds its own
/// OS lock and shared readers coexist. Names map to `<dir>/<name>.lock`;
/// bytes outside `[A-Za-z0-9._-]` are percent-encoded, so distinct names
/// never share a file.
#[derive(Debug)]
pub struct FileLockManager {
    dir: PathBuf,
    options: LockerOptions,
}

impl FileLockManager {
    /// Exclusive locks under `dir`, no timeout.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_options(dir, LockerOptions::default())
    }

    /// Locks under `dir` using `options`.
    pub fn with_options(dir: impl Into<PathBuf>, options: LockerOptions) -> Self {
        FileLockManager {
            dir: dir.into(),
            options,
        }
    }

    /// Lock file path for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let mut file_name = String::with_capacity(name.len());
        for byte in name.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                file_name.push(char::from(byte));
            } else {
                file_name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.lock", file_name))
    }
}

impl LockManager for FileLockManager {
    type Lock = FileLock;

    fn get_lock(&self, name: &str) -> Result<Arc<FileLock>, LockError> {
        Ok(Arc::new(FileLock::with_options(
            self.lock_path(name),
            self.options.clone(),
        )))
    }
}
