//! Extension API handed to modules

use modswap_kernel::{GentleUnload, Module};
use std::sync::Arc;

use super::gentle::GentleUnloadRegistry;
use super::ignore::IgnoreList;

/// What a loaded module may ask of the lifecycle manager
#[derive(Clone)]
pub struct ExtensionApi {
    gentle: Arc<GentleUnloadRegistry>,
    ignore: Arc<IgnoreList>,
}

impl ExtensionApi {
    pub(crate) fn new(gentle: Arc<GentleUnloadRegistry>, ignore: Arc<IgnoreList>) -> Self {
        Self { gentle, ignore }
    }

    /// Ask to be consulted before being unloaded. A module can register
    /// once; later calls return `false`.
    pub fn register_gentle_unload(&self, module: &Module, negotiator: Arc<dyn GentleUnload>) -> bool {
        self.gentle.register(module.id(), negotiator)
    }

    pub fn unregister_gentle_unload(&self, module: &Module) -> bool {
        self.gentle.unregister(module.id())
    }

    /// Exempt a module from bulk and automatic operations
    pub fn add_to_ignore_list(&self, name: &str) -> bool {
        self.ignore.add(name)
    }
}
