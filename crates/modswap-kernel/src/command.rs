//! Command dispatch model
//!
//! Hosts keep a flat alias → handler table ([`CommandTable`]) and may keep a
//! tree-structured dispatcher next to it ([`CommandDispatcher`]) that clients
//! use for suggestions. Ownership of an entry is not stored in the table: it
//! is read from the handler, either from a declared owner or by inspecting
//! the handler's fields.

use std::sync::Arc;

use crate::module::ModuleId;

/// Separator between a module name and a command in namespaced aliases
pub const NAMESPACE_SEPARATOR: char = ':';

/// Build the namespaced alias `"<module>:<command>"`, lower-cased
pub fn namespaced_alias(module: &str, command: &str) -> String {
    format!("{}{}{}", module, NAMESPACE_SEPARATOR, command).to_lowercase()
}

/// Errors raised while inspecting a handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InspectError {
    /// The handler's backing code is gone (its loader was closed)
    #[error("resource closed: {0}")]
    ResourceClosed(String),

    #[error("handler cannot be inspected: {0}")]
    Unsupported(String),
}

/// Value of one handler field as seen by structural inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A reference to a module
    Module(ModuleId),
    Text(String),
    Opaque,
}

/// One declared field of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerField {
    pub name: String,
    pub value: FieldValue,
}

impl HandlerField {
    pub fn module(name: &str, id: ModuleId) -> Self {
        Self {
            name: name.to_string(),
            value: FieldValue::Module(id),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: FieldValue::Text(value.to_string()),
        }
    }
}

/// A command handler registered in the host's tables
pub trait CommandHandler: Send + Sync {
    /// Command label
    fn label(&self) -> &str;

    /// Owner declared through the host's public API, if the handler type has one
    fn owner(&self) -> Option<ModuleId> {
        None
    }

    /// Enumerate the handler's fields.
    ///
    /// Handlers that do not follow the alias convention and have no declared
    /// owner are attributed to a module by looking for a field that refers
    /// to it.
    fn inspect(&self) -> Result<Vec<HandlerField>, InspectError>;

    /// Run the command
    fn execute(&self, args: &[&str]) -> Result<String, String>;
}

/// One flat-table entry
#[derive(Clone)]
pub struct CommandEntry {
    pub alias: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandEntry {
    pub fn new(alias: &str, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            alias: alias.to_string(),
            handler,
        }
    }

    /// Module part of a namespaced alias
    pub fn namespace(&self) -> Option<&str> {
        self.alias
            .rfind(NAMESPACE_SEPARATOR)
            .map(|idx| &self.alias[..idx])
    }

    /// Command part of the alias
    pub fn command(&self) -> &str {
        match self.alias.rfind(NAMESPACE_SEPARATOR) {
            Some(idx) => &self.alias[idx + 1..],
            None => &self.alias,
        }
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("alias", &self.alias)
            .field("label", &self.handler.label())
            .finish()
    }
}

/// Flat alias → handler table. Always present.
pub trait CommandTable: Send + Sync {
    /// Register a handler. Returns `false` when the alias is already taken.
    fn register(&self, alias: &str, handler: Arc<dyn CommandHandler>) -> bool;

    /// Remove an alias. Removing an absent alias returns `false`.
    fn unregister(&self, alias: &str) -> bool;

    fn get(&self, alias: &str) -> Option<CommandEntry>;

    /// Snapshot of every entry
    fn entries(&self) -> Vec<CommandEntry>;
}

/// Tree-structured dispatcher used for client-side completion
pub trait CommandDispatcher: Send + Sync {
    /// Insert or replace the node for `alias`
    fn insert(&self, alias: &str, handler: Arc<dyn CommandHandler>);

    /// Remove the node for `alias`. Removing an absent node returns `false`.
    fn remove(&self, alias: &str) -> bool;

    fn contains(&self, alias: &str) -> bool;

    /// Top-level node names
    fn aliases(&self) -> Vec<String>;

    /// Snapshot of every top-level node with its handler
    fn entries(&self) -> Vec<CommandEntry>;

    /// Rebuild internal state, returning the new version counter
    fn sync(&self) -> u64;

    fn version(&self) -> u64;

    /// Tell connected clients to refresh their command suggestions
    fn notify_clients(&self);
}
