//! Loading source units
//!
//! The reloader does not know how to execute code. A [`LoadCapability`]
//! does that, and talks back to the reloader through a [`LoadContext`]:
//! nested `require`s re-enter the loader so their edges are recorded, and
//! definitions are bound through the context so they land in the tracked
//! namespace.
//!
//! Loading a file snapshots the namespace, executes the file, and diffs the
//! namespace afterwards. New names that no nested load claimed belong to
//! the file. If execution fails, every new name is removed again before the
//! error is returned.
//!
//! Rebinding a name another file owns is held back until the rebinding file
//! finishes: on success ownership moves over, on failure the old binding is
//! put back and the old owner keeps it.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::error::{load_error, ReloadErrorContext, ReloadResult};
use crate::events::ReloadEvent;
use crate::name::QualifiedName;
use crate::namespace::{Binding, DefinitionKind, DefinitionValue, Namespace};
use crate::reloader::{ReloadState, Reloader};

/// A file handed to the load capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: PathBuf,
    is_reload: bool,
}

impl SourceUnit {
    pub(crate) fn new(path: &Path, is_reload: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            is_reload,
        }
    }

    /// Canonical path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this file was loaded successfully before
    pub fn is_reload(&self) -> bool {
        self.is_reload
    }

    pub fn read_to_string(&self) -> ReloadResult<String> {
        std::fs::read_to_string(&self.path).reload_context(&self.path)
    }
}

/// A rebind of a name owned by another file, made by a load still running
#[derive(Debug, Clone)]
pub(crate) struct PendingTransfer {
    file: PathBuf,
    name: QualifiedName,
    /// Binding before `file` first touched it
    previous: Binding,
}

/// Executes a source unit's code
///
/// Implementations bind definitions with [`LoadContext::define`] and pull in
/// other files with [`LoadContext::require`]. Returning an error aborts the
/// load; the reloader rolls back whatever the unit bound so far.
pub trait LoadCapability: Send + Sync {
    fn execute(&self, unit: &SourceUnit, cx: &mut LoadContext<'_>) -> anyhow::Result<()>;
}

impl<F> LoadCapability for F
where
    F: Fn(&SourceUnit, &mut LoadContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, unit: &SourceUnit, cx: &mut LoadContext<'_>) -> anyhow::Result<()> {
        self(unit, cx)
    }
}

/// Handle a load capability uses while a file executes
pub struct LoadContext<'a> {
    reloader: &'a mut Reloader,
    current: PathBuf,
}

impl<'a> LoadContext<'a> {
    fn new(reloader: &'a mut Reloader, current: PathBuf) -> Self {
        Self { reloader, current }
    }

    /// File being executed
    pub fn path(&self) -> &Path {
        &self.current
    }

    /// Load another file from inside this one. Relative paths resolve
    /// against the directory of the requiring file. Files that are already
    /// loaded, or currently loading further up the stack, are not executed
    /// again; the dependency edge is recorded either way.
    pub fn require(&mut self, path: impl AsRef<Path>) -> ReloadResult<()> {
        let path = path.as_ref();
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current
                .parent()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.to_path_buf())
        };
        self.reloader.require_from(&self.current, &target)
    }

    /// Bind (or rebind) a definition in the namespace
    pub fn define(
        &mut self,
        name: &str,
        kind: DefinitionKind,
        value: impl Any + Send + Sync,
    ) -> ReloadResult<()> {
        self.define_value(name, kind, Arc::new(value))
    }

    /// Like [`LoadContext::define`] with an already shared value
    pub fn define_value(&mut self, name: &str, kind: DefinitionKind, value: DefinitionValue) -> ReloadResult<()> {
        let name = QualifiedName::parse(name)?;
        self.reloader.define_from(&self.current, name, kind, value);
        Ok(())
    }

    pub fn namespace(&self) -> &Namespace {
        self.reloader.namespace()
    }

    /// Downcast the value bound to `name`
    pub fn value<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.reloader.namespace().value(name)
    }
}

impl Reloader {
    /// Execute `path` through the load capability and attribute what it
    /// defines. `path` must already be canonical.
    pub(crate) fn load(&mut self, path: &Path, is_reload: bool) -> ReloadResult<()> {
        let event = if is_reload {
            ReloadEvent::Reloading(path.to_path_buf())
        } else {
            ReloadEvent::Loading(path.to_path_buf())
        };
        self.logger.log(&event);

        self.graph.track(path);
        let previous = self.enter(ReloadState::Loading);
        let before = self.registry.snapshot();
        let unit = SourceUnit::new(path, is_reload);
        let capability = Arc::clone(&self.capability);

        self.load_stack.push(path.to_path_buf());
        let mark = self.transfers.len();
        let result = {
            let mut cx = LoadContext::new(self, path.to_path_buf());
            capability.execute(&unit, &mut cx)
        };
        self.load_stack.pop();
        // Nested loads settled theirs already
        let transfers = self.transfers.split_off(mark);

        // Names a nested load already claimed are not ours
        let fresh: Vec<QualifiedName> = self
            .registry
            .diff_new(&before)
            .into_iter()
            .filter(|name| self.graph.owner(name).is_none())
            .filter(|name| self.registry.is_monitored(name))
            .collect();

        let outcome = match result {
            Ok(()) => {
                for name in fresh {
                    self.graph.record_produced(path, name);
                }
                for transfer in transfers {
                    self.commit_transfer(transfer);
                }
                let modified = self.clock.modified_at(path).unwrap_or(UNIX_EPOCH);
                let node = self.graph.track(path);
                node.loaded_at = Some(modified);
                node.ever_loaded = true;
                node.missing = false;
                log::debug!(
                    "[Reloader::load] {} produced {} definition(s)",
                    path.display(),
                    node.produced.len()
                );
                Ok(())
            }
            Err(source) => {
                self.logger.log(&ReloadEvent::LoadFailed(path.to_path_buf()));
                self.registry.remove_all(fresh);
                for transfer in transfers.into_iter().rev() {
                    log::debug!(
                        "[Reloader::load] restoring {} after failed load of {}",
                        transfer.name,
                        path.display()
                    );
                    let previous = transfer.previous;
                    self.registry
                        .namespace_mut()
                        .define(transfer.name, previous.kind, previous.value);
                }
                self.graph.reset(path);
                self.graph.track(path).loaded_at = None;
                Err(load_error(path, source))
            }
        };

        self.restore(previous);
        outcome
    }

    /// `require` issued from inside `from`'s execution
    pub(crate) fn require_from(&mut self, from: &Path, target: &Path) -> ReloadResult<()> {
        let target = target.canonicalize().reload_context(target)?;
        self.graph.record_require(from, &target);

        if self.load_stack.contains(&target) {
            log::debug!(
                "[Reloader::require_from] circular require of {} from {}",
                target.display(),
                from.display()
            );
            return Ok(());
        }

        let (loaded, ever_loaded) = self
            .graph
            .get(&target)
            .map(|file| (file.is_loaded(), file.ever_loaded))
            .unwrap_or((false, false));
        if loaded {
            return Ok(());
        }
        self.load(&target, ever_loaded)
    }

    /// Bind a definition on behalf of `current`. Redefining a name another
    /// file owns moves ownership here once `current` loads successfully:
    /// the last load wins.
    pub(crate) fn define_from(
        &mut self,
        current: &Path,
        name: QualifiedName,
        kind: DefinitionKind,
        value: DefinitionValue,
    ) {
        let foreign = self
            .graph
            .owner(&name)
            .is_some_and(|owner| owner != current)
            && self.registry.is_monitored(&name);
        let queued = self
            .transfers
            .iter()
            .any(|transfer| transfer.file == current && transfer.name == name);

        if foreign && !queued {
            if let Some(previous) = self.registry.namespace().get(&name).cloned() {
                self.transfers.push(PendingTransfer {
                    file: current.to_path_buf(),
                    name: name.clone(),
                    previous,
                });
            }
        }

        self.registry.namespace_mut().define(name, kind, value);
    }

    fn commit_transfer(&mut self, transfer: PendingTransfer) {
        let PendingTransfer { file, name, .. } = transfer;
        if let Some(from) = self.graph.record_produced(&file, name.clone()) {
            self.logger.log(&ReloadEvent::OwnershipTransferred { name, from, to: file });
        }
    }
}
