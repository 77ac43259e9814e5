//! Unloading changed files
//!
//! A change to a file invalidates every file that transitively required it:
//! their definitions may hold on to the old ones. Unloading therefore
//! removes the definitions of the whole dependent closure and resets each
//! file's graph entry so the next load starts clean.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::name::QualifiedName;
use crate::reloader::{ReloadState, Reloader};

impl Reloader {
    /// Unload `file` and every file depending on it. Returns the affected
    /// files, `file` first, in breadth-first order.
    pub(crate) fn unload(&mut self, file: &Path) -> Vec<PathBuf> {
        let previous = self.enter(ReloadState::Unloading);
        let victims = self.graph.closure_of_dependents(file);

        let mut doomed: BTreeSet<QualifiedName> = victims
            .iter()
            .filter_map(|victim| self.graph.get(victim))
            .flat_map(|tracked| tracked.produced.iter().cloned())
            .collect();
        if self.registry.scope().is_restricted() {
            let dynamic = self.dynamic_descendants(&doomed);
            doomed.extend(dynamic);
        }

        log::debug!(
            "[Reloader::unload] {} invalidates {} file(s), {} definition(s)",
            file.display(),
            victims.len(),
            doomed.len()
        );

        self.registry.remove_all(doomed);
        for victim in &victims {
            self.graph.reset(victim);
            if let Some(tracked) = self.graph.get_mut(victim) {
                tracked.loaded_at = None;
            }
        }

        self.restore(previous);
        victims
    }

    /// Descendants of the configured roots that no load produced (created
    /// at runtime) and that descend from something about to be removed
    pub(crate) fn dynamic_descendants(&self, doomed: &BTreeSet<QualifiedName>) -> BTreeSet<QualifiedName> {
        let namespace = self.registry.namespace();
        self.registry
            .roots()
            .iter()
            .flat_map(|root| self.registry.discover_descendants(root))
            .filter(|candidate| !doomed.contains(candidate) && self.graph.owner(candidate).is_none())
            .filter(|candidate| {
                doomed
                    .iter()
                    .any(|ancestor| namespace.is_strict_descendant(candidate, ancestor))
            })
            .collect()
    }
}
