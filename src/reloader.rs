//! Reloader engine
//!
//! Owns the namespace, the dependency graph and the collaborators, and runs
//! the per-request cycle: check tracked files for changes (at most once per
//! cooldown window per file), unload what changed together with everything
//! that depends on it, and load it all again.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::clock::{FileClock, SystemClock};
use crate::config::ReloaderConfig;
use crate::error::{ReloadError, ReloadErrorContext, ReloadResult};
use crate::events::{LogCrateLogger, ReloadEvent, ReloadLogger};
use crate::graph::DependencyGraph;
use crate::loader::{LoadCapability, PendingTransfer};
use crate::name::QualifiedName;
use crate::namespace::Namespace;
use crate::registry::{DefinitionRegistry, ScopeRestriction};
use crate::watcher::SourceFilter;

/// What the reloader is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReloadState {
    #[default]
    Idle,
    Checking,
    Unloading,
    Loading,
}

/// A directory whose files are tracked as a group
#[derive(Debug, Clone)]
pub(crate) struct TrackedDir {
    pub(crate) path: PathBuf,
    pub(crate) filter: SourceFilter,
    pub(crate) last_checked: Option<Instant>,
}

/// Builder for [`Reloader`]
pub struct ReloaderBuilder {
    capability: Arc<dyn LoadCapability>,
    config: ReloaderConfig,
    clock: Option<Arc<dyn FileClock>>,
    logger: Option<Arc<dyn ReloadLogger>>,
    namespace: Option<Namespace>,
}

impl ReloaderBuilder {
    pub fn new(capability: impl LoadCapability + 'static) -> Self {
        Self {
            capability: Arc::new(capability),
            config: ReloaderConfig::default(),
            clock: None,
            logger: None,
            namespace: None,
        }
    }

    pub fn config(mut self, config: ReloaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Timestamp source; defaults to the filesystem
    pub fn clock(mut self, clock: Arc<dyn FileClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Event sink; defaults to the `log` facade
    pub fn logger(mut self, logger: Arc<dyn ReloadLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Start from a namespace the host already populated
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn build(self) -> Reloader {
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(LogCrateLogger) as Arc<dyn ReloadLogger>);
        let clock = self.clock.unwrap_or_else(|| default_clock(&self.config));
        let scope = ScopeRestriction::from_config(&self.config.subclasses, logger.as_ref());
        let registry = DefinitionRegistry::new(self.namespace.unwrap_or_default(), scope, Arc::clone(&logger));

        log::info!(
            "[ReloaderBuilder::build] cooldown {:?}, reload {}, scope {:?}",
            self.config.cooldown,
            self.config.reload,
            registry.scope()
        );

        Reloader {
            config: self.config,
            clock,
            logger,
            capability: self.capability,
            registry,
            graph: DependencyGraph::new(),
            dirs: Vec::new(),
            load_stack: Vec::new(),
            transfers: Vec::new(),
            state: ReloadState::Idle,
        }
    }
}

fn default_clock(config: &ReloaderConfig) -> Arc<dyn FileClock> {
    #[cfg(feature = "watch")]
    {
        if config.watch {
            return Arc::new(crate::watcher::WatchedClock::new());
        }
    }
    #[cfg(not(feature = "watch"))]
    {
        if config.watch {
            log::warn!("[ReloaderBuilder::build] watch requested but the `watch` feature is disabled");
        }
    }
    Arc::new(SystemClock)
}

/// Hot-reload engine
pub struct Reloader {
    pub(crate) config: ReloaderConfig,
    pub(crate) clock: Arc<dyn FileClock>,
    pub(crate) logger: Arc<dyn ReloadLogger>,
    pub(crate) capability: Arc<dyn LoadCapability>,
    pub(crate) registry: DefinitionRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) dirs: Vec<TrackedDir>,
    /// Files currently executing, innermost last
    pub(crate) load_stack: Vec<PathBuf>,
    /// Rebinds of names other files own, settled when the loading file
    /// finishes
    pub(crate) transfers: Vec<PendingTransfer>,
    pub(crate) state: ReloadState,
}

impl Reloader {
    pub fn builder(capability: impl LoadCapability + 'static) -> ReloaderBuilder {
        ReloaderBuilder::new(capability)
    }

    /// Track and load `path` as an entry point. Does nothing if the file
    /// is already loaded.
    pub fn require(&mut self, path: impl AsRef<Path>) -> ReloadResult<()> {
        let path = path.as_ref();
        let path = path.canonicalize().reload_context(path)?;

        let node = self.graph.track(&path);
        node.entry_point = true;
        if node.is_loaded() {
            return Ok(());
        }
        let ever_loaded = node.ever_loaded;
        self.load(&path, ever_loaded)
    }

    /// Load every file in `dir`, and pick up files added to it later
    pub fn require_dir(&mut self, dir: impl AsRef<Path>) -> ReloadResult<()> {
        self.require_dir_filtered(dir, SourceFilter::any())
    }

    /// Like [`Reloader::require_dir`], for files passing `filter` only
    pub fn require_dir_filtered(&mut self, dir: impl AsRef<Path>, filter: SourceFilter) -> ReloadResult<()> {
        let dir = dir.as_ref();
        let dir = dir.canonicalize().reload_context(dir)?;
        let files = filter.scan(&dir)?;

        log::info!(
            "[Reloader::require_dir] tracking {} ({} file(s))",
            dir.display(),
            files.len()
        );

        let now = self.clock.now();
        match self.dirs.iter_mut().find(|tracked| tracked.path == dir) {
            Some(tracked) => {
                tracked.filter = filter;
                tracked.last_checked = Some(now);
            }
            None => self.dirs.push(TrackedDir {
                path: dir,
                filter,
                last_checked: Some(now),
            }),
        }

        let failures = files.iter().filter_map(|file| self.require(file).err()).collect();
        settle(failures)
    }

    /// Run one check cycle: reload every changed file and its dependents,
    /// load files new to tracked directories. Failures of one file do not
    /// stop the others; the first one is returned.
    pub fn reload(&mut self) -> ReloadResult<()> {
        if !self.config.reload {
            return Ok(());
        }

        let previous = self.enter(ReloadState::Checking);
        let now = self.clock.now();
        let added = self.scan_dirs(now);
        let stale = self.stale_files(now);

        let mut pending: Vec<PathBuf> = Vec::new();
        for file in &stale {
            // Outermost dependents first; loading them re-requires the rest
            for victim in self.unload(file).into_iter().rev() {
                if !pending.contains(&victim) {
                    pending.push(victim);
                }
            }
        }

        let mut failures = Vec::new();
        for file in pending {
            let Some(node) = self.graph.get(&file) else {
                continue;
            };
            if node.is_loaded() || node.missing {
                continue;
            }
            let ever_loaded = node.ever_loaded;
            if let Err(e) = self.load(&file, ever_loaded) {
                failures.push(e);
            }
        }

        for file in added {
            if let Err(e) = self.require(&file) {
                failures.push(e);
            }
        }

        self.restore(previous);
        settle(failures)
    }

    /// Remove every tracked definition and forget all tracked files
    pub fn clear(&mut self) {
        let previous = self.enter(ReloadState::Unloading);

        let mut doomed: BTreeSet<QualifiedName> = self
            .graph
            .files()
            .flat_map(|file| file.produced.iter().cloned())
            .collect();
        if self.registry.scope().is_restricted() {
            let dynamic = self.dynamic_descendants(&doomed);
            doomed.extend(dynamic);
        }

        log::info!(
            "[Reloader::clear] forgetting {} file(s), {} definition(s)",
            self.graph.len(),
            doomed.len()
        );

        self.registry.remove_all(doomed);
        self.graph.clear();
        self.dirs.clear();
        self.load_stack.clear();
        self.transfers.clear();
        self.restore(previous);
    }

    pub fn namespace(&self) -> &Namespace {
        self.registry.namespace()
    }

    /// Mutable access for host-side bindings
    pub fn namespace_mut(&mut self) -> &mut Namespace {
        self.registry.namespace_mut()
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &ReloaderConfig {
        &self.config
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Whether `path` is a tracked file
    pub fn is_tracked(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref()
            .canonicalize()
            .map(|path| self.graph.contains(&path))
            .unwrap_or(false)
    }

    pub(crate) fn enter(&mut self, state: ReloadState) -> ReloadState {
        std::mem::replace(&mut self.state, state)
    }

    pub(crate) fn restore(&mut self, previous: ReloadState) {
        self.state = previous;
    }

    /// Files in due directories that are not tracked yet
    fn scan_dirs(&mut self, now: Instant) -> Vec<PathBuf> {
        let cooldown = self.config.cooldown;
        let mut added = Vec::new();

        for dir in &mut self.dirs {
            let due = dir
                .last_checked
                .map(|last| now.saturating_duration_since(last) >= cooldown)
                .unwrap_or(true);
            if !due {
                continue;
            }
            dir.last_checked = Some(now);

            match dir.filter.scan(&dir.path) {
                Ok(files) => added.extend(files.into_iter().filter(|file| !self.graph.contains(file))),
                Err(e) => log::warn!("[Reloader::scan_dirs] cannot list {}: {}", dir.path.display(), e),
            }
        }

        added
    }

    /// Tracked files whose timestamp changed since their last load. Reads
    /// each timestamp at most once per cooldown window.
    fn stale_files(&mut self, now: Instant) -> Vec<PathBuf> {
        let cooldown = self.config.cooldown;
        let mut stale = Vec::new();

        for path in self.graph.check_order() {
            let due = self
                .graph
                .get(&path)
                .map(|file| file.due_for_check(now, cooldown))
                .unwrap_or(false);
            if !due {
                continue;
            }

            let modified = self.clock.modified_at(&path);
            let Some(file) = self.graph.get_mut(&path) else {
                continue;
            };
            file.last_checked = Some(now);

            let changed = match (modified, file.loaded_at) {
                (None, _) if file.missing => false,
                (None, _) => {
                    file.missing = true;
                    self.logger.log(&ReloadEvent::Unloading(path.clone()));
                    true
                }
                (Some(_), _) if file.missing => {
                    file.missing = false;
                    true
                }
                (Some(_), None) => true,
                (Some(modified), Some(loaded_at)) => modified > loaded_at,
            };
            if changed {
                stale.push(path);
            }
        }

        if !stale.is_empty() {
            log::debug!("[Reloader::stale_files] {} changed file(s)", stale.len());
        }
        stale
    }
}

/// First failure wins; the rest are logged
fn settle(failures: Vec<ReloadError>) -> ReloadResult<()> {
    let mut failures = failures.into_iter();
    let Some(first) = failures.next() else {
        return Ok(());
    };
    for other in failures {
        log::error!("[Reloader] {}", other);
    }
    Err(first)
}
