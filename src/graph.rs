//! Dependency graph
//!
//! Tracks, per source file, which definitions it produced, which files it
//! required and which files required it. Edges may form cycles; every
//! traversal is visited-set based.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::name::QualifiedName;

/// Bookkeeping for one tracked file
#[derive(Debug, Clone)]
pub struct TrackedFile {
    /// Canonical path
    pub path: PathBuf,
    /// Modification time observed at the last successful load; `None`
    /// while the file is unloaded, failed or never loaded
    pub loaded_at: Option<SystemTime>,
    /// Loaded successfully at least once
    pub ever_loaded: bool,
    /// When the file's timestamp was last read
    pub last_checked: Option<Instant>,
    /// Required from the host rather than from another file
    pub entry_point: bool,
    /// The file no longer exists on disk
    pub missing: bool,
    pub produced: BTreeSet<QualifiedName>,
    pub requires: BTreeSet<PathBuf>,
    pub required_by: BTreeSet<PathBuf>,
}

impl TrackedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            loaded_at: None,
            ever_loaded: false,
            last_checked: None,
            entry_point: false,
            missing: false,
            produced: BTreeSet::new(),
            requires: BTreeSet::new(),
            required_by: BTreeSet::new(),
        }
    }

    /// Loaded and not invalidated since
    pub fn is_loaded(&self) -> bool {
        self.loaded_at.is_some()
    }

    /// Whether the cooldown window since the last check has elapsed
    pub fn due_for_check(&self, now: Instant, cooldown: Duration) -> bool {
        match self.last_checked {
            Some(last) => now.saturating_duration_since(last) >= cooldown,
            None => true,
        }
    }
}

/// File -> definitions / file -> file graph
#[derive(Debug, Default)]
pub struct DependencyGraph {
    files: FxHashMap<PathBuf, TrackedFile>,
    /// Insertion order, for deterministic iteration
    order: Vec<PathBuf>,
    /// Definition -> owning file
    owners: FxHashMap<QualifiedName, PathBuf>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the node for `path`
    pub fn track(&mut self, path: &Path) -> &mut TrackedFile {
        if !self.files.contains_key(path) {
            self.order.push(path.to_path_buf());
        }
        self.files
            .entry(path.to_path_buf())
            .or_insert_with(|| TrackedFile::new(path.to_path_buf()))
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut TrackedFile> {
        self.files.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Tracked files in the order they were first seen
    pub fn files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.order.iter().filter_map(|path| self.files.get(path))
    }

    /// Entry points first, then everything else, each in insertion order
    pub fn check_order(&self) -> Vec<PathBuf> {
        let (mut entries, rest): (Vec<_>, Vec<_>) = self
            .files()
            .map(|file| (file.entry_point, file.path.clone()))
            .partition(|(entry, _)| *entry);
        entries.extend(rest);
        entries.into_iter().map(|(_, path)| path).collect()
    }

    /// Record that `from` required `to`. Idempotent.
    pub fn record_require(&mut self, from: &Path, to: &Path) {
        self.track(from).requires.insert(to.to_path_buf());
        self.track(to).required_by.insert(from.to_path_buf());
    }

    /// Attribute `name` to `file`. If another file owned it, that file
    /// loses it and its path is returned.
    pub fn record_produced(&mut self, file: &Path, name: QualifiedName) -> Option<PathBuf> {
        let previous = self.owners.insert(name.clone(), file.to_path_buf());
        let transferred = previous.filter(|old| old.as_path() != file);
        if let Some(old) = &transferred {
            if let Some(old_file) = self.files.get_mut(old) {
                old_file.produced.remove(&name);
            }
        }
        self.track(file).produced.insert(name);
        transferred
    }

    pub fn owner(&self, name: &QualifiedName) -> Option<&Path> {
        self.owners.get(name).map(PathBuf::as_path)
    }

    /// `file` plus every file that transitively required it, breadth-first
    pub fn closure_of_dependents(&self, file: &Path) -> Vec<PathBuf> {
        let mut visited = FxHashSet::default();
        let mut closure = Vec::new();
        let mut queue = VecDeque::new();

        visited.insert(file.to_path_buf());
        queue.push_back(file.to_path_buf());

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.files.get(&current) {
                for dependent in &node.required_by {
                    if visited.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
            closure.push(current);
        }

        closure
    }

    /// Clear a file's produced definitions and outgoing edges. Incoming
    /// edges stay; they belong to the requiring files.
    pub fn reset(&mut self, path: &Path) {
        let Some(node) = self.files.get_mut(path) else {
            return;
        };
        let produced = std::mem::take(&mut node.produced);
        let requires = std::mem::take(&mut node.requires);

        for name in produced {
            if self.owners.get(&name).map(PathBuf::as_path) == Some(path) {
                self.owners.remove(&name);
            }
        }
        for target in requires {
            if let Some(target_node) = self.files.get_mut(&target) {
                target_node.required_by.remove(path);
            }
        }
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.files.clear();
        self.order.clear();
        self.owners.clear();
    }
}
