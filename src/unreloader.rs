//! Request-level façade
//!
//! [`Unreloader`] pairs a [`Reloader`] with an entry block. Every
//! [`Unreloader::call`] runs one reload cycle and then the entry block, so
//! whatever the block builds from the namespace is rebuilt against the
//! freshly loaded definitions.

use std::path::Path;

use crate::error::{ReloadError, ReloadResult};
use crate::namespace::Namespace;
use crate::reloader::Reloader;
use crate::watcher::SourceFilter;

type EntryBlock<T> = Box<dyn FnMut(&Namespace) -> anyhow::Result<T> + Send>;

/// Reloader plus the entry block re-run after every cycle
pub struct Unreloader<T> {
    reloader: Reloader,
    entry: EntryBlock<T>,
}

impl<T> Unreloader<T> {
    pub fn new<F>(reloader: Reloader, entry: F) -> Self
    where
        F: FnMut(&Namespace) -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            reloader,
            entry: Box::new(entry),
        }
    }

    pub fn require(&mut self, path: impl AsRef<Path>) -> ReloadResult<()> {
        self.reloader.require(path)
    }

    pub fn require_dir(&mut self, dir: impl AsRef<Path>) -> ReloadResult<()> {
        self.reloader.require_dir(dir)
    }

    pub fn require_dir_filtered(&mut self, dir: impl AsRef<Path>, filter: SourceFilter) -> ReloadResult<()> {
        self.reloader.require_dir_filtered(dir, filter)
    }

    /// Reload changed files, then run the entry block. A failed reload
    /// skips the entry block.
    pub fn call(&mut self) -> ReloadResult<T> {
        self.reloader.reload()?;
        (self.entry)(self.reloader.namespace()).map_err(ReloadError::Entry)
    }

    pub fn reloader(&self) -> &Reloader {
        &self.reloader
    }

    pub fn reloader_mut(&mut self) -> &mut Reloader {
        &mut self.reloader
    }

    pub fn clear(&mut self) {
        self.reloader.clear();
    }
}
