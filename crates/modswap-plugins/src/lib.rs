//! modswap plugins
//!
//! The lifecycle core and a reference host:
//! - [`hot_reload`]: take modules out of a running host, load them back in
//!   and watch the module directory for changes
//! - [`host`]: an in-memory host that loads modules from zip archives

pub mod host;
pub mod hot_reload;

pub use host::{InMemoryHost, InMemoryHostBuilder};
pub use hot_reload::{
    BulkReport, ExtensionApi, LifecycleError, LifecycleManager, ModuleFilter, StatusMessage,
    UnloadReport, UnloadWarning, WatchLoop,
};

pub use modswap_kernel::{Module, ModuleDescriptor, ModuleHandle, ModuleHost};
