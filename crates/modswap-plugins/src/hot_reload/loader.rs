//! Locating module archives
//!
//! Resolves a module name to the archive that provides it and hashes
//! archives for change detection.

use modswap_kernel::ModuleHost;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a module name could not be resolved to an archive
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("Module directory does not exist: {0}")]
    DirectoryMissing(PathBuf),

    #[error("No archive provides a module named {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content hash of a file, as lowercase hex
pub fn calculate_hash(path: &Path) -> std::io::Result<String> {
    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Finds archives inside the module directory
#[derive(Debug, Clone)]
pub struct ModuleLocator {
    dir: PathBuf,
    extension: String,
}

impl ModuleLocator {
    pub fn new<P: AsRef<Path>>(dir: P, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn dir_exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Whether `path` carries the load-eligible extension
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// `<dir>/<name>.<ext>`
    pub fn exact_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, self.extension))
    }

    /// Load-eligible regular files of the module directory, sorted by file name
    pub fn eligible_files(&self) -> Result<Vec<PathBuf>, LocateError> {
        if !self.dir_exists() {
            return Err(LocateError::DirectoryMissing(self.dir.clone()));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && self.is_eligible(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Resolve `name` to an archive.
    ///
    /// The exact file name wins. Otherwise every eligible archive's
    /// descriptor is read, in lexicographic file-name order, and the first
    /// one declaring `name` (case-insensitively) is returned. Archives
    /// whose descriptor cannot be read are skipped.
    pub fn resolve(&self, host: &dyn ModuleHost, name: &str) -> Result<PathBuf, LocateError> {
        if !self.dir_exists() {
            return Err(LocateError::DirectoryMissing(self.dir.clone()));
        }

        let exact = self.exact_path(name);
        if exact.is_file() {
            return Ok(exact);
        }

        for path in self.eligible_files()? {
            match host.module_descriptor_from_archive(&path) {
                Ok(descriptor) if descriptor.is_named(name) => {
                    debug!("Resolved {} to {:?}", name, path);
                    return Ok(path);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {:?} while resolving {}: {}", path, name, e),
            }
        }

        Err(LocateError::NotFound(name.to_string()))
    }
}
