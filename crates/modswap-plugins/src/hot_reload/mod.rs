//! Hot unload, load and reload of modules in a running host
//!
//! - Gentle-unload negotiation before a module is taken out
//! - Command table reconciliation, with an ownership fallback for handlers
//!   that do not follow the alias convention
//! - Event subscription purging
//! - Module registry detaching and code loader teardown
//! - A polling watch loop for automatic load, unload and reload

mod api;
mod commands;
mod events;
mod gentle;
mod ignore;
mod loader;
mod manager;
mod registry;
mod state;
mod status;
mod teardown;
mod watcher;

pub use api::ExtensionApi;
pub use commands::{
    CommandReconciler, CommandRemoval, ConventionResolver, OwnerResolver, Ownership,
    StructuralResolver, TieredResolver,
};
pub use events::{EventPurger, PurgeOutcome};
pub use gentle::GentleUnloadRegistry;
pub use ignore::IgnoreList;
pub use loader::{LocateError, ModuleLocator, calculate_hash};
pub use manager::{LifecycleError, LifecycleManager, ModuleFilter, UnloadReport, UnloadWarning};
pub use registry::{Inconsistency, RegistryDetach, RegistrySync};
pub use state::{FileTracker, TrackedFile};
pub use status::{BulkReport, OperationStatus, StatusMessage};
pub use teardown::LoaderTeardown;
pub use watcher::{TickOutcome, TickSummary, WatchLoop, WatchTimer};
