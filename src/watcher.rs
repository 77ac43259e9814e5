//! Source discovery and watch-backed timestamps
//!
//! [`SourceFilter`] decides which files in a required directory are source
//! units. [`WatchedClock`] (feature `watch`) caches modification times and
//! only re-reads a file's metadata after the filesystem watcher reported an
//! event for it.

use std::path::{Path, PathBuf};

use crate::error::{ReloadErrorContext, ReloadResult};

/// File filter for directory scans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFilter {
    /// Accepted extensions; empty accepts every regular file
    extensions: Vec<String>,
}

impl SourceFilter {
    /// Accept every regular file
    pub fn any() -> Self {
        Self::default()
    }

    /// Accept files with one of `extensions` (without the dot)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if file passes filter
    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }

    /// Canonical paths of the matching regular files directly inside `dir`,
    /// sorted
    pub fn scan(&self, dir: &Path) -> ReloadResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).reload_context(dir)? {
            let path = entry.reload_context(dir)?.path();
            if path.is_file() && self.matches(&path) {
                found.push(path.canonicalize().reload_context(&path)?);
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(feature = "watch")]
pub use self::watched::WatchedClock;

#[cfg(feature = "watch")]
mod watched {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::SystemTime;

    use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
    use parking_lot::Mutex;
    use rustc_hash::{FxHashMap, FxHashSet};

    use crate::clock::{FileClock, SystemClock};

    /// Timestamp cache invalidated by filesystem events
    ///
    /// Falls back to reading metadata on every call when the platform
    /// watcher cannot be started or a directory cannot be watched.
    pub struct WatchedClock {
        cache: Mutex<FxHashMap<PathBuf, Option<SystemTime>>>,
        dirty: Arc<Mutex<FxHashSet<PathBuf>>>,
        rescan: Arc<AtomicBool>,
        watcher: Mutex<Option<RecommendedWatcher>>,
        watched_dirs: Mutex<FxHashSet<PathBuf>>,
    }

    impl Default for WatchedClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WatchedClock {
        pub fn new() -> Self {
            let dirty = Arc::new(Mutex::new(FxHashSet::default()));
            let rescan = Arc::new(AtomicBool::new(false));
            let dirty_events = Arc::clone(&dirty);
            let rescan_events = Arc::clone(&rescan);

            let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if event.need_rescan() {
                        rescan_events.store(true, Ordering::SeqCst);
                    }
                    match event.kind {
                        EventKind::Access(_) => {}
                        _ => dirty_events.lock().extend(event.paths),
                    }
                }
                Err(e) => {
                    log::warn!("[WatchedClock] watcher error, dropping cached timestamps: {}", e);
                    rescan_events.store(true, Ordering::SeqCst);
                }
            });

            let watcher = match watcher {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log::warn!("[WatchedClock::new] file watcher unavailable, reading timestamps directly: {}", e);
                    None
                }
            };

            Self {
                cache: Mutex::new(FxHashMap::default()),
                dirty,
                rescan,
                watcher: Mutex::new(watcher),
                watched_dirs: Mutex::new(FxHashSet::default()),
            }
        }

        /// Whether a platform watcher is running
        pub fn is_watching(&self) -> bool {
            self.watcher.lock().is_some()
        }

        /// Drop every cached timestamp
        pub fn invalidate(&self) {
            self.cache.lock().clear();
        }

        fn watch_parent(&self, path: &Path) -> bool {
            let Some(dir) = path.parent() else {
                return false;
            };
            if self.watched_dirs.lock().contains(dir) {
                return true;
            }

            let mut watcher = self.watcher.lock();
            let Some(watcher) = watcher.as_mut() else {
                return false;
            };
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched_dirs.lock().insert(dir.to_path_buf());
                    true
                }
                Err(e) => {
                    log::warn!("[WatchedClock::watch_parent] cannot watch {}: {}", dir.display(), e);
                    false
                }
            }
        }
    }

    impl FileClock for WatchedClock {
        fn modified_at(&self, path: &Path) -> Option<SystemTime> {
            if self.rescan.swap(false, Ordering::SeqCst) {
                self.invalidate();
            }

            let changed = self.dirty.lock().remove(path);
            if !changed {
                if let Some(cached) = self.cache.lock().get(path) {
                    return *cached;
                }
            }

            // Watch first so a write racing the read still marks the path dirty
            let watched = self.watch_parent(path);
            let fresh = SystemClock.modified_at(path);
            if watched {
                self.cache.lock().insert(path.to_path_buf(), fresh);
            }
            fresh
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_first_lookup_watches_parent_before_caching() {
            let dir = TempDir::new().unwrap();
            let file = dir.path().join("app.rb");
            std::fs::write(&file, "class App; end").unwrap();
            let file = file.canonicalize().unwrap();
            let parent = file.parent().unwrap().to_path_buf();

            let clock = WatchedClock::new();
            let read = clock.modified_at(&file);
            assert!(read.is_some());

            if clock.is_watching() {
                assert!(clock.watched_dirs.lock().contains(&parent));
                assert_eq!(clock.cache.lock().get(&file).copied(), Some(read));
            } else {
                assert!(clock.cache.lock().is_empty());
            }

            // A change reported after the read bypasses the cache
            clock.dirty.lock().insert(file.clone());
            assert_eq!(clock.modified_at(&file), read);
            assert!(!clock.dirty.lock().contains(&file));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_filter() {
        let filter = SourceFilter::new(["rb", "rhai"]);

        assert!(filter.matches(Path::new("app.rb")));
        assert!(filter.matches(Path::new("rules.rhai")));
        assert!(!filter.matches(Path::new("notes.txt")));
        assert!(!filter.matches(Path::new("no_extension")));
        assert!(SourceFilter::any().matches(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_lists_matching_files_sorted() {
        let dir = TempDir::new().expect("Failed to create temp directory for scan test");
        std::fs::write(dir.path().join("b.rb"), "").unwrap();
        std::fs::write(dir.path().join("a.rb"), "").unwrap();
        std::fs::write(dir.path().join("readme.md"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested.rb")).unwrap();

        let found = SourceFilter::new(["rb"]).scan(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.rb", "b.rb"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[cfg(feature = "watch")]
    #[test]
    fn test_watched_clock_sees_modifications() {
        use crate::clock::FileClock;
        use std::time::{Duration, Instant};

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("app.rb");
        std::fs::write(&file, "class App; end").unwrap();
        let file = file.canonicalize().unwrap();

        let clock = WatchedClock::new();
        let first = clock.modified_at(&file).expect("file exists");

        let later = first + Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .and_then(|f| f.set_modified(later))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = clock.modified_at(&file);
        while seen != Some(later) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            seen = clock.modified_at(&file);
        }
        assert_eq!(seen, Some(later));
    }
}
