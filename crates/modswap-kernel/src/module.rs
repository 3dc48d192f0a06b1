//! Module model
//!
//! A [`Module`] is owned by the host. Everything else only ever holds a
//! [`ModuleHandle`] (an `Arc` clone) and compares modules by [`ModuleId`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::loader::CodeLoader;

/// Shared reference to a host-owned module
pub type ModuleHandle = Arc<Module>;

/// Identity of one loaded module instance.
///
/// A fresh id is minted on every load, so a reloaded module never compares
/// equal to the instance it replaced even though both carry the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(uuid::Uuid);

impl ModuleId {
    /// Mint a new id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Raw UUID
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A command a module declares in its descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSpec {
    /// Short description shown in listings
    pub description: Option<String>,
    /// Usage line
    pub usage: Option<String>,
    /// Additional aliases
    pub aliases: Vec<String>,
}

/// Descriptor read from a module archive.
///
/// `name` and `version` are required, everything else is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleDescriptor {
    /// Declared module name
    pub name: String,
    /// Declared version string
    pub version: String,
    /// Registered entry point. Absent for declarative modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Host API version the module was built against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Authors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Declared commands, keyed by command name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandSpec>,
}

impl ModuleDescriptor {
    /// Create a descriptor with only the required fields
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            main: None,
            api_version: None,
            description: None,
            authors: Vec::new(),
            commands: BTreeMap::new(),
        }
    }

    /// Set the entry point
    pub fn with_main(mut self, main: &str) -> Self {
        self.main = Some(main.to_string());
        self
    }

    /// Set the API version
    pub fn with_api_version(mut self, version: u32) -> Self {
        self.api_version = Some(version);
        self
    }

    /// Set the description
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// Add an author
    pub fn with_author(mut self, author: &str) -> Self {
        self.authors.push(author.to_string());
        self
    }

    /// Declare a command
    pub fn with_command(mut self, name: &str, spec: CommandSpec) -> Self {
        self.commands.insert(name.to_string(), spec);
        self
    }

    /// `name vversion`, as shown in listings
    pub fn full_name(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }

    /// Check the required fields.
    ///
    /// Names may contain ASCII letters, digits, `_`, `-` and `.`; the `:`
    /// separator used by namespaced command aliases is therefore never
    /// part of a name.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is empty".to_string());
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(format!("name '{}' contains invalid character '{}'", self.name, c));
        }
        if self.version.trim().is_empty() {
            return Err("version is empty".to_string());
        }
        Ok(())
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A loaded module
pub struct Module {
    id: ModuleId,
    descriptor: ModuleDescriptor,
    path: PathBuf,
    enabled: AtomicBool,
    loader: Arc<dyn CodeLoader>,
}

impl Module {
    /// Create a module record. Hosts call this from their load step.
    pub fn new(descriptor: ModuleDescriptor, path: PathBuf, loader: Arc<dyn CodeLoader>) -> Self {
        Self {
            id: ModuleId::new(),
            descriptor,
            path,
            enabled: AtomicBool::new(false),
            loader,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// Backing archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the backing archive
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the enabled flag. Only hosts should call this.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// The isolated loader holding this module's code
    pub fn loader(&self) -> &Arc<dyn CodeLoader> {
        &self.loader
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .field("path", &self.path)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
