//! Gentle-unload negotiation

use modswap_kernel::{GentleUnload, ModuleId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// At most one negotiator per module. Registrations are never expired and
/// stay in place after the module is unloaded; only the module itself
/// removes them.
pub struct GentleUnloadRegistry {
    negotiators: RwLock<HashMap<ModuleId, Arc<dyn GentleUnload>>>,
    timeout: Option<Duration>,
}

impl Default for GentleUnloadRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GentleUnloadRegistry {
    /// `timeout` bounds [`Self::negotiate`]; expiry counts as a refusal
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            negotiators: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a negotiator. A second registration for the same module
    /// returns `false` and changes nothing.
    pub fn register(&self, module: ModuleId, negotiator: Arc<dyn GentleUnload>) -> bool {
        let mut negotiators = self.negotiators.write();
        if negotiators.contains_key(&module) {
            return false;
        }
        negotiators.insert(module, negotiator);
        debug!("Registered gentle-unload negotiator for {}", module);
        true
    }

    pub fn unregister(&self, module: ModuleId) -> bool {
        self.negotiators.write().remove(&module).is_some()
    }

    pub fn is_registered(&self, module: ModuleId) -> bool {
        self.negotiators.read().contains_key(&module)
    }

    pub fn len(&self) -> usize {
        self.negotiators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.negotiators.read().is_empty()
    }

    /// Ask the module's negotiator for consent. No negotiator means consent.
    pub async fn negotiate(&self, module: ModuleId) -> bool {
        let negotiator = self.negotiators.read().get(&module).cloned();
        let Some(negotiator) = negotiator else {
            return true;
        };

        info!("Negotiating gentle unload with {}", module);
        let consent = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, negotiator.ask_for_gentle_unload()).await {
                Ok(consent) => consent,
                Err(_) => {
                    warn!(
                        module = %module,
                        timeout_secs = limit.as_secs(),
                        "gentle-unload negotiation timed out, treating as refusal"
                    );
                    false
                }
            },
            None => negotiator.ask_for_gentle_unload().await,
        };

        if !consent {
            info!("{} refused to be unloaded", module);
        }
        consent
    }
}
