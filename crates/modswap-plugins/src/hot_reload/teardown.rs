//! Loader teardown

use modswap_kernel::{LoaderError, Module};
use tracing::{debug, warn};

/// Detaches and closes a module's code loader.
///
/// Both steps always run; a failed detach does not keep the archive open.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoaderTeardown;

impl LoaderTeardown {
    /// Tear the loader down, returning every step that failed
    pub fn run(&self, module: &Module) -> Vec<LoaderError> {
        let loader = module.loader();
        let mut failures = Vec::new();

        if let Err(e) = loader.detach() {
            warn!("Failed to detach loader of {}: {}", module.name(), e);
            failures.push(e);
        }

        if loader.is_closed() {
            debug!("Loader of {} already closed", module.name());
        } else if let Err(e) = loader.close() {
            warn!("Failed to close loader of {}: {}", module.name(), e);
            failures.push(e);
        }

        failures
    }
}
