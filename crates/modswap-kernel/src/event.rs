//! Event subscriptions

use std::sync::Arc;

use crate::module::ModuleId;

/// Receives dispatched events
pub trait EventHandler: Send + Sync {
    fn handle(&self, event_type: &str, payload: &serde_json::Value);
}

impl<F> EventHandler for F
where
    F: Fn(&str, &serde_json::Value) + Send + Sync,
{
    fn handle(&self, event_type: &str, payload: &serde_json::Value) {
        self(event_type, payload)
    }
}

/// An (event type, handler, owner) registration
#[derive(Clone)]
pub struct EventSubscription {
    pub event_type: String,
    /// Lower runs first
    pub priority: i32,
    pub owner: ModuleId,
    pub handler: Arc<dyn EventHandler>,
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .finish()
    }
}

/// Public subscription API every host offers
pub trait EventBus: Send + Sync {
    fn subscribe(&self, subscription: EventSubscription);

    /// Remove one owner's subscriptions for one event type, returning how many went
    fn unsubscribe(&self, event_type: &str, owner: ModuleId) -> usize;

    /// Deliver an event to every subscriber in priority order, returning the count
    fn dispatch(&self, event_type: &str, payload: &serde_json::Value) -> usize;
}

/// The host's internal per-event-type subscriber table.
///
/// Not every host exposes it; see [`crate::host::ModuleHost::event_registry`].
pub trait EventRegistry: Send + Sync {
    fn event_types(&self) -> Vec<String>;

    /// Keep only the subscriptions of `event_type` for which `keep` returns
    /// `true`, returning how many were removed
    fn retain(&self, event_type: &str, keep: &mut dyn FnMut(&EventSubscription) -> bool) -> usize;

    /// Snapshot of one event type's subscribers, in dispatch order
    fn subscribers(&self, event_type: &str) -> Vec<EventSubscription>;
}
