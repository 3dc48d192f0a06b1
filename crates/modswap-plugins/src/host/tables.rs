//! Host-side registries
//!
//! The tables a host keeps for itself: the module list and its lookup map,
//! the flat command table, the command tree and the event subscriber
//! table. Each sits behind its own lock; nothing here is transactional.

use modswap_kernel::{
    CommandDispatcher, CommandEntry, CommandHandler, CommandTable, EventBus, EventRegistry,
    EventSubscription, HostError, Module, ModuleHandle, ModuleId, ModuleRegistry,
    RegistryAccessError,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Ordered module list plus lower-cased name lookup
#[derive(Default)]
pub struct ModuleTable {
    list: RwLock<Vec<ModuleHandle>>,
    lookup: RwLock<HashMap<String, ModuleHandle>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly loaded module in both halves
    pub fn add(&self, module: ModuleHandle) -> Result<(), HostError> {
        let key = module.name().to_lowercase();
        let mut lookup = self.lookup.write();
        if lookup.contains_key(&key) {
            return Err(HostError::AlreadyLoaded(module.name().to_string()));
        }
        lookup.insert(key, module.clone());
        self.list.write().push(module);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }
}

impl ModuleRegistry for ModuleTable {
    fn modules(&self) -> Vec<ModuleHandle> {
        self.list.read().clone()
    }

    fn lookup_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lookup.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn lookup(&self, name: &str) -> Option<ModuleHandle> {
        self.lookup.read().get(&name.to_lowercase()).cloned()
    }

    fn remove_from_list(&self, module: &Module) -> Result<bool, RegistryAccessError> {
        let mut list = self.list.write();
        let before = list.len();
        list.retain(|m| m.id() != module.id());
        Ok(list.len() != before)
    }

    fn remove_from_lookup(&self, name: &str, module: &Module) -> Result<bool, RegistryAccessError> {
        let key = name.to_lowercase();
        let mut lookup = self.lookup.write();
        match lookup.get(&key) {
            Some(existing) if existing.id() == module.id() => {
                lookup.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn insert_lookup(&self, module: &ModuleHandle) -> Result<bool, RegistryAccessError> {
        if !self.list.read().iter().any(|m| m.id() == module.id()) {
            return Ok(false);
        }
        let key = module.name().to_lowercase();
        let mut lookup = self.lookup.write();
        if lookup.contains_key(&key) {
            return Ok(false);
        }
        lookup.insert(key, module.clone());
        Ok(true)
    }
}

/// Flat alias → handler table
#[derive(Default)]
pub struct FlatCommandTable {
    entries: RwLock<BTreeMap<String, Arc<dyn CommandHandler>>>,
}

impl FlatCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CommandTable for FlatCommandTable {
    fn register(&self, alias: &str, handler: Arc<dyn CommandHandler>) -> bool {
        let key = alias.to_lowercase();
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            debug!("Alias '{}' already taken", key);
            return false;
        }
        entries.insert(key, handler);
        true
    }

    fn unregister(&self, alias: &str) -> bool {
        self.entries.write().remove(&alias.to_lowercase()).is_some()
    }

    fn get(&self, alias: &str) -> Option<CommandEntry> {
        let key = alias.to_lowercase();
        self.entries
            .read()
            .get(&key)
            .map(|handler| CommandEntry::new(&key, handler.clone()))
    }

    fn entries(&self) -> Vec<CommandEntry> {
        self.entries
            .read()
            .iter()
            .map(|(alias, handler)| CommandEntry::new(alias, handler.clone()))
            .collect()
    }
}

/// Tree dispatcher mirror used for client-side completion.
///
/// Only top-level nodes are modelled; the version counter moves on every
/// [`CommandDispatcher::sync`].
#[derive(Default)]
pub struct CommandTree {
    nodes: RwLock<BTreeMap<String, Arc<dyn CommandHandler>>>,
    version: AtomicU64,
    notifications: AtomicU64,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times clients were told to refresh
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Acquire)
    }
}

impl CommandDispatcher for CommandTree {
    fn insert(&self, alias: &str, handler: Arc<dyn CommandHandler>) {
        self.nodes.write().insert(alias.to_lowercase(), handler);
    }

    fn remove(&self, alias: &str) -> bool {
        self.nodes.write().remove(&alias.to_lowercase()).is_some()
    }

    fn contains(&self, alias: &str) -> bool {
        self.nodes.read().contains_key(&alias.to_lowercase())
    }

    fn aliases(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    fn entries(&self) -> Vec<CommandEntry> {
        self.nodes
            .read()
            .iter()
            .map(|(alias, handler)| CommandEntry::new(alias, handler.clone()))
            .collect()
    }

    fn sync(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn notify_clients(&self) {
        self.notifications.fetch_add(1, Ordering::AcqRel);
    }
}

/// Per-event-type subscriber sets, kept in priority order
#[derive(Default)]
pub struct SubscriberTable {
    by_type: RwLock<BTreeMap<String, Vec<EventSubscription>>>,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total subscriptions across every event type
    pub fn len(&self) -> usize {
        self.by_type.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscriptions held by `owner`, across every event type
    pub fn owned_by(&self, owner: ModuleId) -> usize {
        self.by_type
            .read()
            .values()
            .flat_map(|subs| subs.iter())
            .filter(|s| s.owner == owner)
            .count()
    }
}

impl EventBus for SubscriberTable {
    fn subscribe(&self, subscription: EventSubscription) {
        let mut by_type = self.by_type.write();
        let subs = by_type.entry(subscription.event_type.clone()).or_default();
        // equal priorities keep registration order
        let idx = subs.partition_point(|s| s.priority <= subscription.priority);
        subs.insert(idx, subscription);
    }

    fn unsubscribe(&self, event_type: &str, owner: ModuleId) -> usize {
        self.retain(event_type, &mut |s: &EventSubscription| s.owner != owner)
    }

    fn dispatch(&self, event_type: &str, payload: &serde_json::Value) -> usize {
        let subs = self.subscribers(event_type);
        for sub in &subs {
            sub.handler.handle(event_type, payload);
        }
        subs.len()
    }
}

impl EventRegistry for SubscriberTable {
    fn event_types(&self) -> Vec<String> {
        self.by_type.read().keys().cloned().collect()
    }

    fn retain(&self, event_type: &str, keep: &mut dyn FnMut(&EventSubscription) -> bool) -> usize {
        let mut by_type = self.by_type.write();
        let Some(subs) = by_type.get_mut(event_type) else {
            return 0;
        };
        let before = subs.len();
        subs.retain(|s| keep(s));
        let removed = before - subs.len();
        if subs.is_empty() {
            by_type.remove(event_type);
        }
        removed
    }

    fn subscribers(&self, event_type: &str) -> Vec<EventSubscription> {
        self.by_type
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }
}
