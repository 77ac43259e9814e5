//! File clocks
//!
//! A [`FileClock`] answers "when was this file last modified" and "what
//! time is it now". The reloader never touches file metadata directly, so
//! tests and embedders can swap in their own notion of time.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Source of modification timestamps
pub trait FileClock: Send + Sync {
    /// Modification time of `path`, `None` if the file does not exist
    fn modified_at(&self, path: &Path) -> Option<SystemTime>;

    /// Monotonic "now" used for cooldown bookkeeping
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Reads modification times from the filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl FileClock for SystemClock {
    fn modified_at(&self, path: &Path) -> Option<SystemTime> {
        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(time) => Some(time),
            Err(e) => {
                log::debug!("[SystemClock::modified_at] {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Clock with per-path timestamp overrides and a manually advanced "now"
///
/// Paths without an override fall back to the filesystem.
#[derive(Debug)]
pub struct ManualClock {
    overrides: Mutex<FxHashMap<PathBuf, Option<SystemTime>>>,
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            overrides: Mutex::new(FxHashMap::default()),
            now: Mutex::new(Instant::now()),
        }
    }

    /// Pin the modification time reported for `path`
    pub fn set_modified(&self, path: impl AsRef<Path>, time: SystemTime) {
        self.overrides.lock().insert(Self::key(path.as_ref()), Some(time));
    }

    /// Pin the modification time to `secs` seconds after the epoch
    pub fn set_modified_secs(&self, path: impl AsRef<Path>, secs: u64) {
        self.set_modified(path, UNIX_EPOCH + Duration::from_secs(secs));
    }

    /// Report `path` as missing regardless of the filesystem
    pub fn mark_missing(&self, path: impl AsRef<Path>) {
        self.overrides.lock().insert(Self::key(path.as_ref()), None);
    }

    /// Drop the override for `path`
    pub fn forget(&self, path: impl AsRef<Path>) {
        self.overrides.lock().remove(&Self::key(path.as_ref()));
    }

    /// Move "now" forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    fn key(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }
}

impl FileClock for ManualClock {
    fn modified_at(&self, path: &Path) -> Option<SystemTime> {
        let pinned = self.overrides.lock().get(&Self::key(path)).copied();
        match pinned {
            Some(time) => time,
            None => SystemClock.modified_at(path),
        }
    }

    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
