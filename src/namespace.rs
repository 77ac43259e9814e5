//! Live binding space
//!
//! The namespace is the process-wide table of named definitions that loads
//! populate and the unloader prunes. It keeps a superclass -> subclasses
//! index up to date on every bind/unbind so descendants can be enumerated
//! without reflection.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::name::QualifiedName;

/// Value carried by a binding
pub type DefinitionValue = Arc<dyn Any + Send + Sync>;

/// Name of the implicit root class
pub const ROOT_CLASS: &str = "Object";

/// What kind of definition a name is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionKind {
    /// A class; `None` means it descends directly from `Object`
    Class { superclass: Option<QualifiedName> },
    Module,
}

impl DefinitionKind {
    pub fn class() -> Self {
        DefinitionKind::Class { superclass: None }
    }

    pub fn subclass_of(superclass: QualifiedName) -> Self {
        DefinitionKind::Class {
            superclass: Some(superclass),
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, DefinitionKind::Class { .. })
    }
}

/// A live binding
#[derive(Clone)]
pub struct Binding {
    pub kind: DefinitionKind,
    pub value: DefinitionValue,
    /// Bound by the host outside any tracked load; the tracker never removes it
    pub preexisting: bool,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("preexisting", &self.preexisting)
            .finish_non_exhaustive()
    }
}

/// Process-wide namespace
#[derive(Debug)]
pub struct Namespace {
    bindings: BTreeMap<QualifiedName, Binding>,
    /// superclass -> direct subclasses
    subclasses: FxHashMap<QualifiedName, BTreeSet<QualifiedName>>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// Create a namespace holding only the builtin root class
    pub fn new() -> Self {
        let mut namespace = Self {
            bindings: BTreeMap::new(),
            subclasses: FxHashMap::default(),
        };
        namespace.define_builtin(
            Self::root_class(),
            DefinitionKind::Class { superclass: None },
            Arc::new(()),
        );
        namespace
    }

    pub fn root_class() -> QualifiedName {
        QualifiedName::new_unchecked(ROOT_CLASS.to_string())
    }

    /// Bind a host-owned name the tracker must never remove
    pub fn define_builtin(&mut self, name: QualifiedName, kind: DefinitionKind, value: DefinitionValue) {
        self.bind(name, kind, value, true);
    }

    /// Bind or rebind a name. Rebinding keeps the pre-existing flag of the
    /// original binding.
    pub fn define(&mut self, name: QualifiedName, kind: DefinitionKind, value: DefinitionValue) {
        self.bind(name, kind, value, false);
    }

    fn bind(&mut self, name: QualifiedName, kind: DefinitionKind, value: DefinitionValue, preexisting: bool) {
        let old = self
            .bindings
            .get(&name)
            .map(|old| (self.superclass_of_kind(&name, &old.kind), old.preexisting));
        let preexisting = match old {
            Some((old_super, was_preexisting)) => {
                if let Some(parent) = old_super {
                    self.unlink_subclass(&parent, &name);
                }
                was_preexisting || preexisting
            }
            None => preexisting,
        };

        if let Some(parent) = self.superclass_of_kind(&name, &kind) {
            self.subclasses.entry(parent).or_default().insert(name.clone());
        }

        self.bindings.insert(
            name,
            Binding {
                kind,
                value,
                preexisting,
            },
        );
    }

    /// Remove `name` and every binding nested under it, except pre-existing
    /// ones. Returns the names that were unbound, `name` first; empty if
    /// `name` was not bound.
    pub fn unbind(&mut self, name: &QualifiedName) -> Vec<QualifiedName> {
        if !self.bindings.contains_key(name) {
            return Vec::new();
        }

        let prefix = name.nested_prefix();
        let nested: Vec<QualifiedName> = self
            .bindings
            .range(QualifiedName::new_unchecked(prefix.clone())..)
            .take_while(|(n, _)| n.as_str().starts_with(&prefix))
            .filter(|(_, binding)| !binding.preexisting)
            .map(|(n, _)| n.clone())
            .collect();

        let mut removed = Vec::with_capacity(nested.len() + 1);
        for victim in std::iter::once(name.clone()).chain(nested) {
            if let Some(binding) = self.bindings.remove(&victim) {
                if let Some(parent) = self.superclass_of_kind(&victim, &binding.kind) {
                    self.unlink_subclass(&parent, &victim);
                }
                removed.push(victim);
            }
        }
        removed
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Look a binding up by raw name
    pub fn lookup(&self, raw: &str) -> Option<&Binding> {
        QualifiedName::parse(raw).ok().and_then(|name| self.bindings.get(&name))
    }

    /// Downcast a binding's value
    pub fn value<T: Any + Send + Sync>(&self, raw: &str) -> Option<&T> {
        self.lookup(raw).and_then(|binding| binding.value.downcast_ref::<T>())
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.bindings.contains_key(name)
    }

    /// Every bound name
    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.bindings.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Superclass of a bound class. Classes without an explicit superclass
    /// report `Object`; `Object` itself and modules report `None`.
    pub fn superclass(&self, name: &QualifiedName) -> Option<QualifiedName> {
        self.bindings
            .get(name)
            .and_then(|binding| self.superclass_of_kind(name, &binding.kind))
    }

    /// Whether `name` is a class whose superclass chain passes through
    /// `ancestor` (strictly: a class is not its own descendant)
    pub fn is_strict_descendant(&self, name: &QualifiedName, ancestor: &QualifiedName) -> bool {
        let mut seen = FxHashSet::default();
        let mut current = self.superclass(name);
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            if !seen.insert(parent.clone()) {
                return false;
            }
            current = self.superclass(&parent);
        }
        false
    }

    /// All live classes descending from `root`, transitively
    pub fn descendants(&self, root: &QualifiedName) -> BTreeSet<QualifiedName> {
        let mut found = BTreeSet::new();
        let mut stack = vec![root.clone()];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.subclasses.get(&current) {
                for child in children {
                    if found.insert(child.clone()) {
                        stack.push(child.clone());
                    }
                }
            }
        }
        found
    }

    fn superclass_of_kind(&self, name: &QualifiedName, kind: &DefinitionKind) -> Option<QualifiedName> {
        match kind {
            DefinitionKind::Class { superclass: Some(parent) } => Some(parent.clone()),
            DefinitionKind::Class { superclass: None } if name.as_str() != ROOT_CLASS => {
                Some(Self::root_class())
            }
            _ => None,
        }
    }

    fn unlink_subclass(&mut self, parent: &QualifiedName, child: &QualifiedName) {
        if let Some(children) = self.subclasses.get_mut(parent) {
            children.remove(child);
            if children.is_empty() {
                self.subclasses.remove(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    #[test]
    fn test_new_namespace_has_builtin_root() {
        let ns = Namespace::new();
        let root = ns.get(&name("Object")).unwrap();
        assert!(root.preexisting);
        assert!(root.kind.is_class());
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_unbind_removes_nested_names_only() {
        let mut ns = Namespace::new();
        ns.define(name("App"), DefinitionKind::Module, Arc::new(1u32));
        ns.define(name("App::Inner"), DefinitionKind::class(), Arc::new(2u32));
        ns.define(name("App::Inner::Deep"), DefinitionKind::Module, Arc::new(3u32));
        ns.define(name("AppTwo"), DefinitionKind::Module, Arc::new(4u32));
        ns.define(name("App2"), DefinitionKind::Module, Arc::new(5u32));

        let removed = ns.unbind(&name("App"));
        assert_eq!(removed, vec![name("App"), name("App::Inner"), name("App::Inner::Deep")]);
        assert!(ns.contains(&name("AppTwo")));
        assert!(ns.contains(&name("App2")));
        assert!(ns.unbind(&name("App")).is_empty());
    }

    #[test]
    fn test_unbind_keeps_nested_builtins() {
        let mut ns = Namespace::new();
        ns.define(name("App"), DefinitionKind::Module, Arc::new(1u32));
        ns.define_builtin(name("App::Host"), DefinitionKind::class(), Arc::new(2u32));
        ns.define(name("App::Page"), DefinitionKind::class(), Arc::new(3u32));

        assert_eq!(ns.unbind(&name("App")), vec![name("App"), name("App::Page")]);
        assert_eq!(ns.value::<u32>("App::Host"), Some(&2));
        assert!(ns.descendants(&name("Object")).contains(&name("App::Host")));
    }

    #[test]
    fn test_descendant_index_follows_rebinding() {
        let mut ns = Namespace::new();
        ns.define(name("App"), DefinitionKind::class(), Arc::new(()));
        ns.define(name("App2"), DefinitionKind::subclass_of(name("App")), Arc::new(()));
        ns.define(name("App3"), DefinitionKind::subclass_of(name("App2")), Arc::new(()));

        assert_eq!(
            ns.descendants(&name("App")),
            [name("App2"), name("App3")].into_iter().collect()
        );
        assert!(ns.is_strict_descendant(&name("App3"), &name("App")));
        assert!(ns.is_strict_descendant(&name("App"), &name("Object")));
        assert!(!ns.is_strict_descendant(&name("App"), &name("App")));

        // Re-parent App2 directly under Object
        ns.define(name("App2"), DefinitionKind::class(), Arc::new(()));
        assert!(ns.descendants(&name("App")).is_empty());
        assert!(!ns.is_strict_descendant(&name("App3"), &name("App")));
    }

    #[test]
    fn test_rebinding_keeps_preexisting_flag() {
        let mut ns = Namespace::new();
        ns.define_builtin(name("Host"), DefinitionKind::Module, Arc::new(1u8));
        ns.define(name("Host"), DefinitionKind::Module, Arc::new(2u8));

        let binding = ns.get(&name("Host")).unwrap();
        assert!(binding.preexisting);
        assert_eq!(ns.value::<u8>("Host"), Some(&2));
    }
}
