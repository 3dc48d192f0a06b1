//! Code loaders and module entry points

use std::sync::Arc;

use crate::command::CommandTable;
use crate::event::EventBus;
use crate::module::{ModuleDescriptor, ModuleHandle};

/// Errors raised while tearing a code loader down
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LoaderError {
    #[error("Failed to detach loader back-references: {0}")]
    Detach(String),

    #[error("Failed to close loader: {0}")]
    Close(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The isolated loading context holding a module's code.
///
/// While a loader is open its backing archive stays open too, which on some
/// platforms keeps the file locked. A loader must therefore be detached and
/// closed once every registry reference to its module is gone.
pub trait CodeLoader: Send + Sync {
    /// The module instance, `None` once detached
    fn entry(&self) -> Option<Arc<dyn ModuleEntry>>;

    /// Descriptor the loader was initialised with, `None` once detached
    fn init_metadata(&self) -> Option<ModuleDescriptor>;

    /// Drop the back-references to the module instance and its metadata
    fn detach(&self) -> Result<(), LoaderError>;

    /// Release the underlying resource handle. Closing twice is a no-op.
    fn close(&self) -> Result<(), LoaderError>;

    fn is_closed(&self) -> bool;
}

/// What a module gets to see of the host while its hooks run
#[derive(Clone)]
pub struct ModuleContext {
    /// The module whose hook is running
    pub module: ModuleHandle,
    /// Public command registration
    pub commands: Arc<dyn CommandTable>,
    /// Public event subscription
    pub events: Arc<dyn EventBus>,
}

/// A module's own code.
///
/// Hooks run on the caller's thread; a panicking hook is caught by the host
/// and reported as a hook failure.
pub trait ModuleEntry: Send + Sync {
    /// Called once after the module was registered, before the first enable
    fn on_load(&self, _ctx: &ModuleContext) -> Result<(), String> {
        Ok(())
    }

    /// Called when the host enables the module
    fn on_enable(&self, _ctx: &ModuleContext) -> Result<(), String> {
        Ok(())
    }

    /// Called when the host disables the module
    fn on_disable(&self, _ctx: &ModuleContext) -> Result<(), String> {
        Ok(())
    }

    /// Run one of the module's declared commands
    fn on_command(&self, label: &str, _args: &[&str]) -> Result<String, String> {
        Err(format!("command '{}' has no executor", label))
    }
}

/// Entry point for modules that only declare commands in their descriptor
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclarativeModule;

impl ModuleEntry for DeclarativeModule {}
