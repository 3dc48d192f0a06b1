//! Event subscription purging

use modswap_kernel::{EventRegistry, EventSubscription, ModuleHost, ModuleId};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Outcome of one purge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// Number of subscriptions removed
    Purged(usize),
    /// The host does not expose its listener table
    Unreachable,
}

/// Removes a module's subscriptions from every event type.
///
/// The host's listener table is looked up on first use and remembered,
/// including when the host does not expose one.
pub struct EventPurger {
    host: Arc<dyn ModuleHost>,
    registry: OnceLock<Option<Arc<dyn EventRegistry>>>,
}

impl EventPurger {
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self {
            host,
            registry: OnceLock::new(),
        }
    }

    fn registry(&self) -> Option<&Arc<dyn EventRegistry>> {
        self.registry
            .get_or_init(|| {
                let registry = self.host.event_registry();
                if registry.is_none() {
                    warn!("Host does not expose its listener table; subscriptions will not be purged");
                }
                registry
            })
            .as_ref()
    }

    pub fn purge(&self, owner: ModuleId) -> PurgeOutcome {
        let Some(registry) = self.registry() else {
            return PurgeOutcome::Unreachable;
        };

        let mut removed = 0;
        for event_type in registry.event_types() {
            let count =
                registry.retain(&event_type, &mut |sub: &EventSubscription| sub.owner != owner);
            if count > 0 {
                debug!("Removed {} '{}' subscription(s) of {}", count, event_type, owner);
            }
            removed += count;
        }
        PurgeOutcome::Purged(removed)
    }

    /// Subscriptions still held by `owner`, when the table is reachable
    pub fn remaining(&self, owner: ModuleId) -> Option<usize> {
        let registry = self.registry()?;
        Some(
            registry
                .event_types()
                .iter()
                .map(|t| {
                    registry
                        .subscribers(t)
                        .iter()
                        .filter(|s| s.owner == owner)
                        .count()
                })
                .sum(),
        )
    }
}
