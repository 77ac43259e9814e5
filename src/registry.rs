//! Definition registry
//!
//! Wraps the live [`Namespace`] with the rules the tracker follows when it
//! attributes and removes definitions: pre-existing bindings are never
//! removed, and in scope-restricted mode only monitored names are touched.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::SubclassRoots;
use crate::events::{ReloadEvent, ReloadLogger};
use crate::name::QualifiedName;
use crate::namespace::{DefinitionKind, Namespace};

/// Which definitions the tracker may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeRestriction {
    /// Every definition a load produces
    #[default]
    Unrestricted,
    /// Modules named exactly like a root, and classes strictly descending
    /// from a root class
    Roots(Vec<QualifiedName>),
}

impl ScopeRestriction {
    /// Build a restriction from configured names. Invalid names are
    /// reported and dropped; an empty configuration is unrestricted.
    pub fn from_config(roots: &SubclassRoots, logger: &dyn ReloadLogger) -> Self {
        if roots.is_empty() {
            return ScopeRestriction::Unrestricted;
        }

        let valid = roots
            .names()
            .iter()
            .filter_map(|raw| match QualifiedName::parse(raw) {
                Ok(name) => Some(name),
                Err(_) => {
                    logger.log(&ReloadEvent::InvalidConstantName(raw.clone()));
                    None
                }
            })
            .collect();
        ScopeRestriction::Roots(valid)
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, ScopeRestriction::Roots(_))
    }
}

/// Why a removal did not happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotBound,
    /// Bound by the host before any tracked load touched it
    PreExisting,
    /// Outside the configured roots
    OutOfScope,
}

/// Result of [`DefinitionRegistry::remove`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Unbound, along with `nested` names nested under it
    Removed { nested: usize },
    Skipped(SkipReason),
}

/// Name -> definition registry over the live namespace
pub struct DefinitionRegistry {
    namespace: Namespace,
    scope: ScopeRestriction,
    logger: Arc<dyn ReloadLogger>,
}

impl DefinitionRegistry {
    pub fn new(namespace: Namespace, scope: ScopeRestriction, logger: Arc<dyn ReloadLogger>) -> Self {
        Self {
            namespace,
            scope,
            logger,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    pub fn scope(&self) -> &ScopeRestriction {
        &self.scope
    }

    /// Every currently bound name
    pub fn snapshot(&self) -> BTreeSet<QualifiedName> {
        self.namespace.names().cloned().collect()
    }

    /// Names bound now that were not bound in `before`
    pub fn diff_new(&self, before: &BTreeSet<QualifiedName>) -> BTreeSet<QualifiedName> {
        self.namespace
            .names()
            .filter(|name| !before.contains(*name))
            .cloned()
            .collect()
    }

    /// Whether the tracker may attribute and remove `name`
    pub fn is_monitored(&self, name: &QualifiedName) -> bool {
        let roots = match &self.scope {
            ScopeRestriction::Unrestricted => return true,
            ScopeRestriction::Roots(roots) => roots,
        };
        let Some(binding) = self.namespace.get(name) else {
            return false;
        };

        roots.iter().any(|root| match &binding.kind {
            DefinitionKind::Module => root == name,
            DefinitionKind::Class { .. } => {
                self.namespace.contains(root) && self.namespace.is_strict_descendant(name, root)
            }
        })
    }

    /// Unbind `name` (and everything nested under it) from the namespace.
    /// Never fails: anything that must not be removed is skipped.
    pub fn remove(&mut self, name: &QualifiedName) -> RemoveOutcome {
        self.remove_all([name.clone()])
            .pop()
            .map(|(_, outcome)| outcome)
            .unwrap_or(RemoveOutcome::Skipped(SkipReason::NotBound))
    }

    /// Remove several names. Every skip decision is taken before anything
    /// is unbound, so removing a superclass cannot take its subclasses out
    /// of scope halfway through.
    pub fn remove_all<I>(&mut self, names: I) -> Vec<(QualifiedName, RemoveOutcome)>
    where
        I: IntoIterator<Item = QualifiedName>,
    {
        let decisions: Vec<(QualifiedName, Option<SkipReason>)> = names
            .into_iter()
            .map(|name| {
                let skip = self.skip_reason(&name);
                (name, skip)
            })
            .collect();

        decisions
            .into_iter()
            .map(|(name, skip)| {
                let outcome = match skip {
                    Some(reason) => RemoveOutcome::Skipped(reason),
                    None => {
                        // Gone already if it was nested under an earlier name
                        let removed = self.namespace.unbind(&name);
                        if removed.is_empty() {
                            RemoveOutcome::Skipped(SkipReason::NotBound)
                        } else {
                            RemoveOutcome::Removed {
                                nested: removed.len() - 1,
                            }
                        }
                    }
                };
                self.report(&name, &outcome);
                (name, outcome)
            })
            .collect()
    }

    fn skip_reason(&self, name: &QualifiedName) -> Option<SkipReason> {
        match self.namespace.get(name) {
            None => Some(SkipReason::NotBound),
            Some(binding) if binding.preexisting => Some(SkipReason::PreExisting),
            Some(_) if !self.is_monitored(name) => Some(SkipReason::OutOfScope),
            Some(_) => None,
        }
    }

    fn report(&self, name: &QualifiedName, outcome: &RemoveOutcome) {
        match outcome {
            RemoveOutcome::Removed { nested } => {
                self.logger.log(&ReloadEvent::RemovedConstant(name.clone()));
                if *nested > 0 {
                    log::debug!(
                        "[DefinitionRegistry::remove] {} took {} nested name(s) with it",
                        name,
                        nested
                    );
                }
            }
            RemoveOutcome::Skipped(reason) => {
                log::debug!("[DefinitionRegistry::remove] skipped {}: {:?}", name, reason);
            }
        }
    }

    /// Live descendants of a configured root that the tracker may remove.
    /// Empty for unknown roots and in unrestricted mode.
    pub fn discover_descendants(&self, root: &QualifiedName) -> BTreeSet<QualifiedName> {
        let ScopeRestriction::Roots(roots) = &self.scope else {
            return BTreeSet::new();
        };
        if !roots.contains(root) || !self.namespace.contains(root) {
            return BTreeSet::new();
        }

        self.namespace
            .descendants(root)
            .into_iter()
            .filter(|name| {
                self.namespace
                    .get(name)
                    .map(|binding| !binding.preexisting)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Configured roots, empty when unrestricted
    pub fn roots(&self) -> &[QualifiedName] {
        match &self.scope {
            ScopeRestriction::Unrestricted => &[],
            ScopeRestriction::Roots(roots) => roots,
        }
    }
}
