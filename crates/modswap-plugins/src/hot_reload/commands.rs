//! Command table reconciliation
//!
//! Finds the command entries a module owns and takes them out of (or puts
//! them into) the host's flat table and its optional command tree.
//!
//! Ownership is decided by an [`OwnerResolver`]. The [`ConventionResolver`]
//! trusts what the host's API says (a declared owner, or a `"<module>:"`
//! alias prefix); the [`StructuralResolver`] looks through the handler's
//! fields for a module reference. [`TieredResolver`] tries them in that
//! order, and the structural step can be switched off for hosts whose
//! handlers all declare their owner.
//!
//! With the structural step on, a handler whose backing code is closed is
//! reported as stale before any declared owner is consulted, so entries
//! left behind by a dead module instance are swept.

use modswap_kernel::{
    CommandDispatcher, CommandEntry, CommandTable, FieldValue, InspectError, Module,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of an ownership check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NotOwned,
    /// No evidence either way
    Unknown,
    /// The handler's backing code is gone
    Stale(InspectError),
}

/// Decides whether a command entry belongs to a module
pub trait OwnerResolver: Send + Sync {
    fn resolve(&self, entry: &CommandEntry, module: &Module) -> Ownership;
}

/// Declared owner first, then the `"<module>:"` alias prefix
#[derive(Debug, Default, Clone, Copy)]
pub struct ConventionResolver;

impl OwnerResolver for ConventionResolver {
    fn resolve(&self, entry: &CommandEntry, module: &Module) -> Ownership {
        if let Some(owner) = entry.handler.owner() {
            return if owner == module.id() {
                Ownership::Owned
            } else {
                Ownership::NotOwned
            };
        }

        match entry.namespace() {
            Some(ns) if ns.eq_ignore_ascii_case(module.name()) => Ownership::Owned,
            _ => Ownership::Unknown,
        }
    }
}

/// Looks for the first field of the handler that refers to a module
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralResolver;

impl OwnerResolver for StructuralResolver {
    fn resolve(&self, entry: &CommandEntry, module: &Module) -> Ownership {
        let fields = match entry.handler.inspect() {
            Ok(fields) => fields,
            Err(err @ InspectError::ResourceClosed(_)) => return Ownership::Stale(err),
            Err(err) => {
                debug!("Cannot inspect '{}': {}", entry.alias, err);
                return Ownership::Unknown;
            }
        };

        fields
            .iter()
            .find_map(|field| match field.value {
                FieldValue::Module(id) => Some(if id == module.id() {
                    Ownership::Owned
                } else {
                    Ownership::NotOwned
                }),
                _ => None,
            })
            .unwrap_or(Ownership::Unknown)
    }
}

/// Stale check, convention tier, then the structural tier. The stale check
/// and the structural tier only run when enabled.
#[derive(Debug, Clone, Copy)]
pub struct TieredResolver {
    structural: bool,
}

impl TieredResolver {
    pub fn new(structural: bool) -> Self {
        Self { structural }
    }

    pub fn convention_only() -> Self {
        Self::new(false)
    }
}

impl Default for TieredResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OwnerResolver for TieredResolver {
    fn resolve(&self, entry: &CommandEntry, module: &Module) -> Ownership {
        if self.structural {
            if let Err(err @ InspectError::ResourceClosed(_)) = entry.handler.inspect() {
                return Ownership::Stale(err);
            }
        }
        match ConventionResolver.resolve(entry, module) {
            Ownership::Unknown if self.structural => StructuralResolver.resolve(entry, module),
            decided => decided,
        }
    }
}

/// What one reconciliation pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRemoval {
    /// Aliases removed because the module owns them
    pub removed: Vec<String>,
    /// Aliases force-removed because their handler was stale
    pub stale: Vec<String>,
}

impl CommandRemoval {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.stale.is_empty()
    }

    pub fn merge(&mut self, other: CommandRemoval) {
        for alias in other.removed {
            if !self.removed.contains(&alias) {
                self.removed.push(alias);
            }
        }
        for alias in other.stale {
            if !self.stale.contains(&alias) {
                self.stale.push(alias);
            }
        }
    }
}

/// Keeps the flat command table and the command tree in step with the
/// module registry
#[derive(Clone)]
pub struct CommandReconciler {
    table: Arc<dyn CommandTable>,
    tree: Option<Arc<dyn CommandDispatcher>>,
    convention: Arc<dyn OwnerResolver>,
    resolver: Arc<dyn OwnerResolver>,
}

impl CommandReconciler {
    pub fn new(
        table: Arc<dyn CommandTable>,
        tree: Option<Arc<dyn CommandDispatcher>>,
        structural_lookup: bool,
    ) -> Self {
        Self {
            table,
            tree,
            convention: Arc::new(ConventionResolver),
            resolver: Arc::new(TieredResolver::new(structural_lookup)),
        }
    }

    /// Replace the resolver used by [`Self::sweep`] and [`Self::wrap`]
    pub fn with_resolver(mut self, resolver: Arc<dyn OwnerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn has_tree(&self) -> bool {
        self.tree.is_some()
    }

    /// Remove the module's commands, as identified by the convention tier,
    /// from the flat table and the tree
    pub fn unwrap(&self, module: &Module) -> CommandRemoval {
        let removal = self.remove_owned(module, self.convention.as_ref());
        self.sync();
        removal
    }

    /// Remove every remaining entry the full resolver attributes to the
    /// module, plus any stale entry met on the way
    pub fn sweep(&self, module: &Module) -> CommandRemoval {
        let removal = self.remove_owned(module, self.resolver.as_ref());
        self.sync();
        removal
    }

    /// Copy the module's flat-table entries into the tree
    pub fn wrap(&self, module: &Module) -> Vec<String> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };

        let mut added = Vec::new();
        for entry in self.table.entries() {
            if self.resolver.resolve(&entry, module) == Ownership::Owned {
                tree.insert(&entry.alias, entry.handler.clone());
                added.push(entry.alias);
            }
        }
        debug!("Wrapped {} command(s) of {}", added.len(), module.name());
        self.sync();
        added
    }

    /// Remove one alias from both structures. Absent aliases are ignored.
    pub fn remove_alias(&self, alias: &str) -> bool {
        let flat = self.table.unregister(alias);
        let tree = self
            .tree
            .as_ref()
            .map(|tree| tree.remove(alias))
            .unwrap_or(false);
        flat || tree
    }

    /// Bump the tree's version and tell clients to refresh
    pub fn sync(&self) {
        if let Some(tree) = &self.tree {
            let version = tree.sync();
            tree.notify_clients();
            debug!("Command tree synced to version {}", version);
        }
    }

    fn remove_owned(&self, module: &Module, resolver: &dyn OwnerResolver) -> CommandRemoval {
        let mut removal = CommandRemoval::default();

        let mut candidates = self.table.entries();
        if let Some(tree) = &self.tree {
            candidates.extend(tree.entries());
        }

        for entry in candidates {
            if removal.removed.contains(&entry.alias) || removal.stale.contains(&entry.alias) {
                continue;
            }
            match resolver.resolve(&entry, module) {
                Ownership::Owned => {
                    self.remove_alias(&entry.alias);
                    removal.removed.push(entry.alias);
                }
                Ownership::Stale(reason) => {
                    warn!("Force-removing stale command '{}': {}", entry.alias, reason);
                    self.remove_alias(&entry.alias);
                    removal.stale.push(entry.alias);
                }
                Ownership::NotOwned | Ownership::Unknown => {}
            }
        }

        removal
    }
}
