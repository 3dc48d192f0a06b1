//! Module registry synchronization
//!
//! Takes a module out of the host's module list and name lookup table, and
//! repairs entries that exist in only one of the two.

use modswap_kernel::{HostInternals, Module, RegistryAccessError};
use tracing::{debug, warn};

/// What [`RegistrySync::detach`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryDetach {
    pub removed_from_list: bool,
    pub removed_from_lookup: bool,
}

impl RegistryDetach {
    pub fn changed(&self) -> bool {
        self.removed_from_list || self.removed_from_lookup
    }
}

/// A one-sided registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// Lookup key without a matching list entry
    LookupWithoutList(String),
    /// List entry without a lookup key
    ListWithoutLookup(String),
}

/// Edits the host's module list and lookup table
pub struct RegistrySync;

impl RegistrySync {
    /// Remove `module` from both halves. Already removed halves are skipped.
    pub fn detach(
        internals: &HostInternals,
        module: &Module,
    ) -> Result<RegistryDetach, RegistryAccessError> {
        let removed_from_list = internals.modules.remove_from_list(module)?;
        let removed_from_lookup = internals
            .modules
            .remove_from_lookup(&module.name().to_lowercase(), module)?;

        let detach = RegistryDetach {
            removed_from_list,
            removed_from_lookup,
        };
        if detach.changed() {
            debug!(
                "Detached {} from registry (list: {}, lookup: {})",
                module.name(),
                removed_from_list,
                removed_from_lookup
            );
        }
        Ok(detach)
    }

    /// List every one-sided entry
    pub fn check_consistency(internals: &HostInternals) -> Vec<Inconsistency> {
        let modules = internals.modules.modules();
        let mut found = Vec::new();

        for key in internals.modules.lookup_names() {
            let listed = internals
                .modules
                .lookup(&key)
                .is_some_and(|m| modules.iter().any(|l| l.id() == m.id()));
            if !listed {
                found.push(Inconsistency::LookupWithoutList(key));
            }
        }

        for module in &modules {
            let indexed = internals
                .modules
                .lookup(module.name())
                .is_some_and(|m| m.id() == module.id());
            if !indexed {
                found.push(Inconsistency::ListWithoutLookup(module.name().to_string()));
            }
        }

        found
    }

    /// Repair one-sided entries: orphaned lookup keys are dropped, list
    /// entries missing from the lookup table are re-indexed
    pub fn repair(internals: &HostInternals) -> Result<usize, RegistryAccessError> {
        let mut repaired = 0;

        for issue in Self::check_consistency(internals) {
            match issue {
                Inconsistency::LookupWithoutList(key) => {
                    if let Some(orphan) = internals.modules.lookup(&key) {
                        if internals.modules.remove_from_lookup(&key, &orphan)? {
                            repaired += 1;
                        }
                    }
                }
                Inconsistency::ListWithoutLookup(name) => {
                    let module = internals
                        .modules
                        .modules()
                        .into_iter()
                        .find(|m| m.name() == name);
                    if let Some(module) = module {
                        if internals.modules.insert_lookup(&module)? {
                            repaired += 1;
                        } else {
                            warn!("Could not re-index {}: name is taken", name);
                        }
                    }
                }
            }
        }

        Ok(repaired)
    }
}
