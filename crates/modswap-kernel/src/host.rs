//! Host capabilities
//!
//! A host offers a public API for loading modules but nothing for taking
//! them out again. The traits here describe both halves: the public
//! capabilities ([`ModuleHost`], [`CommandTable`], [`EventBus`]) and the
//! internal bookkeeping an unload has to edit ([`ModuleRegistry`],
//! [`EventRegistry`]). The core only ever talks to these traits, so it can be
//! exercised against any host that implements them.

use std::path::Path;
use std::sync::Arc;

use crate::command::{CommandDispatcher, CommandTable};
use crate::event::{EventBus, EventRegistry};
use crate::module::{Module, ModuleDescriptor, ModuleHandle};

/// Errors reported by host capabilities
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HostError {
    /// The archive's descriptor is missing or malformed
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The archive could be read but the host refuses to load it
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    #[error("Incompatible API version: host supports {supported}, module requires {required}")]
    IncompatibleVersion { supported: u32, required: u32 },

    #[error("Module already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),

    /// A module hook failed or panicked
    #[error("Hook '{hook}' of {module} failed: {reason}")]
    Hook {
        module: String,
        hook: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The host's internal registries could not be located or mutated
#[derive(Debug, Clone, thiserror::Error)]
#[error("Registry access failed: {0}")]
pub struct RegistryAccessError(pub String);

/// The host's authoritative module list and its name lookup table.
///
/// Both halves are exposed separately because an unload has to remove the
/// module from each of them; a host never offers this as one operation.
pub trait ModuleRegistry: Send + Sync {
    /// Ordered module list
    fn modules(&self) -> Vec<ModuleHandle>;

    /// Lookup table keys (lower-cased names)
    fn lookup_names(&self) -> Vec<String>;

    fn lookup(&self, name: &str) -> Option<ModuleHandle>;

    /// Remove the exact instance from the ordered list
    fn remove_from_list(&self, module: &Module) -> Result<bool, RegistryAccessError>;

    /// Remove `name` from the lookup table, only if it maps to `module`
    fn remove_from_lookup(&self, name: &str, module: &Module) -> Result<bool, RegistryAccessError>;

    /// Re-insert a lookup entry for a module present in the list
    fn insert_lookup(&self, module: &ModuleHandle) -> Result<bool, RegistryAccessError>;
}

/// Internal registries, located once per unload
#[derive(Clone)]
pub struct HostInternals {
    pub modules: Arc<dyn ModuleRegistry>,
}

/// Public and internal capabilities of a host process
pub trait ModuleHost: Send + Sync {
    /// Snapshot of the module list, in registration order
    fn list_loaded_modules(&self) -> Vec<ModuleHandle>;

    /// Case-insensitive lookup
    fn get_module(&self, name: &str) -> Option<ModuleHandle>;

    /// Read the descriptor of an archive without loading it
    fn module_descriptor_from_archive(&self, path: &Path) -> Result<ModuleDescriptor, HostError>;

    /// Load an archive and register the module (disabled)
    fn load_module_from_file(&self, path: &Path) -> Result<ModuleHandle, HostError>;

    /// Run the module's load hook
    fn initialize_module(&self, module: &ModuleHandle) -> Result<(), HostError>;

    /// Enable a module. Enabling an enabled module is a no-op.
    fn enable_module(&self, module: &ModuleHandle) -> Result<(), HostError>;

    /// Disable a module. Disabling a disabled module is a no-op.
    fn disable_module(&self, module: &ModuleHandle) -> Result<(), HostError>;

    /// Public command registration
    fn command_table(&self) -> Arc<dyn CommandTable>;

    /// Tree dispatcher, when the host has one
    fn command_dispatcher(&self) -> Option<Arc<dyn CommandDispatcher>>;

    /// Public event subscription
    fn event_bus(&self) -> Arc<dyn EventBus>;

    /// Internal subscriber table, when the host exposes it
    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>>;

    /// Locate the internal registries an unload has to edit
    fn internals(&self) -> Result<HostInternals, RegistryAccessError>;

    /// Ask the host to release unreachable resources. Advisory.
    fn reclaim(&self) {}
}
