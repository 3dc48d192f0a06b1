//! File tracking state
//!
//! Remembers, per archive file name, the content hash last seen and the
//! name of the module the archive declared. Only the watch loop reads it
//! for change detection; the lifecycle manager writes it on every load.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// One tracked archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub file_name: String,
    pub hash: String,
    pub module_name: Option<String>,
}

/// In-memory file → hash and file → module name maps
#[derive(Debug, Default)]
pub struct FileTracker {
    hashes: RwLock<BTreeMap<String, String>>,
    names: RwLock<HashMap<String, String>>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file's hash and, when known, the module it declares
    pub fn record(&self, file_name: &str, hash: &str, module_name: Option<&str>) {
        self.hashes
            .write()
            .insert(file_name.to_string(), hash.to_string());
        if let Some(name) = module_name {
            self.names
                .write()
                .insert(file_name.to_string(), name.to_string());
        }
    }

    /// Replace the hash, keeping the module name
    pub fn set_hash(&self, file_name: &str, hash: &str) {
        self.hashes
            .write()
            .insert(file_name.to_string(), hash.to_string());
    }

    pub fn hash(&self, file_name: &str) -> Option<String> {
        self.hashes.read().get(file_name).cloned()
    }

    pub fn module_name(&self, file_name: &str) -> Option<String> {
        self.names.read().get(file_name).cloned()
    }

    pub fn is_tracked(&self, file_name: &str) -> bool {
        self.hashes.read().contains_key(file_name)
    }

    /// Drop both records of a file, returning whether it was tracked
    pub fn forget(&self, file_name: &str) -> bool {
        self.names.write().remove(file_name);
        self.hashes.write().remove(file_name).is_some()
    }

    /// Tracked file names, sorted
    pub fn files(&self) -> Vec<String> {
        self.hashes.read().keys().cloned().collect()
    }

    pub fn get(&self, file_name: &str) -> Option<TrackedFile> {
        let hash = self.hash(file_name)?;
        Some(TrackedFile {
            file_name: file_name.to_string(),
            hash,
            module_name: self.module_name(file_name),
        })
    }

    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }

    pub fn clear(&self) {
        self.hashes.write().clear();
        self.names.write().clear();
    }
}
