//! Module archives
//!
//! An archive is a zip file carrying a `module.yml` descriptor next to any
//! resources the module wants to ship. [`ArchiveLoader`] keeps the archive
//! open for as long as the module is loaded, the same way a class loader
//! keeps its jar open.

use modswap_kernel::{CodeLoader, HostError, LoaderError, ModuleDescriptor, ModuleEntry};
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

/// Name of the descriptor entry inside an archive
pub const DESCRIPTOR_ENTRY: &str = "module.yml";

fn invalid_module(path: &Path, err: ZipError) -> HostError {
    HostError::InvalidModule(format!("{}: {}", path.display(), err))
}

fn read_descriptor_from<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
) -> Result<ModuleDescriptor, HostError> {
    let mut entry = match archive.by_name(DESCRIPTOR_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(HostError::InvalidDescriptor(format!(
                "{} has no {}",
                path.display(),
                DESCRIPTOR_ENTRY
            )));
        }
        Err(e) => return Err(invalid_module(path, e)),
    };

    let mut content = String::new();
    entry.read_to_string(&mut content)?;

    let descriptor: ModuleDescriptor = serde_yaml::from_str(&content)
        .map_err(|e| HostError::InvalidDescriptor(format!("{}: {}", path.display(), e)))?;
    descriptor
        .validate()
        .map_err(|reason| HostError::InvalidDescriptor(format!("{}: {}", path.display(), reason)))?;

    Ok(descriptor)
}

/// Read and validate the descriptor of the archive at `path`
pub fn read_descriptor(path: &Path) -> Result<ModuleDescriptor, HostError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| invalid_module(path, e))?;
    read_descriptor_from(&mut archive, path)
}

/// Write an archive holding `descriptor` and the given extra entries
pub fn write_archive(
    path: &Path,
    descriptor: &ModuleDescriptor,
    resources: &[(&str, &[u8])],
) -> Result<(), HostError> {
    let yaml = serde_yaml::to_string(descriptor)
        .map_err(|e| HostError::InvalidDescriptor(e.to_string()))?;
    let mut entries: Vec<(&str, &[u8])> = vec![(DESCRIPTOR_ENTRY, yaml.as_bytes())];
    entries.extend_from_slice(resources);
    write_raw_archive(path, &entries)
}

/// Write an archive from raw entries, without any descriptor validation
pub fn write_raw_archive(path: &Path, entries: &[(&str, &[u8])]) -> Result<(), HostError> {
    let file = File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, bytes) in entries {
        writer
            .start_file(*name, options)
            .map_err(|e| HostError::Io(std::io::Error::other(e)))?;
        writer.write_all(bytes)?;
    }

    writer
        .finish()
        .map_err(|e| HostError::Io(std::io::Error::other(e)))?;
    Ok(())
}

/// Code loader backed by an open archive
pub struct ArchiveLoader {
    path: PathBuf,
    archive: Mutex<Option<ZipArchive<File>>>,
    entry: RwLock<Option<Arc<dyn ModuleEntry>>>,
    metadata: RwLock<Option<ModuleDescriptor>>,
}

impl ArchiveLoader {
    /// Open the archive at `path` and bind it to a module instance
    pub fn open(
        path: &Path,
        descriptor: ModuleDescriptor,
        entry: Arc<dyn ModuleEntry>,
    ) -> Result<Self, HostError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|e| invalid_module(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(Some(archive)),
            entry: RwLock::new(Some(entry)),
            metadata: RwLock::new(Some(descriptor)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a bundled resource
    pub fn read_resource(&self, name: &str) -> Result<Vec<u8>, LoaderError> {
        let mut guard = self.archive.lock();
        let archive = guard
            .as_mut()
            .ok_or_else(|| LoaderError::Close(format!("{} is closed", self.path.display())))?;

        let mut file = archive
            .by_name(name)
            .map_err(|e| LoaderError::Io(std::io::Error::other(e)))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl CodeLoader for ArchiveLoader {
    fn entry(&self) -> Option<Arc<dyn ModuleEntry>> {
        self.entry.read().clone()
    }

    fn init_metadata(&self) -> Option<ModuleDescriptor> {
        self.metadata.read().clone()
    }

    fn detach(&self) -> Result<(), LoaderError> {
        self.entry.write().take();
        self.metadata.write().take();
        Ok(())
    }

    fn close(&self) -> Result<(), LoaderError> {
        if self.archive.lock().take().is_some() {
            debug!("Closed archive {:?}", self.path);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.archive.lock().is_none()
    }
}

/// Creates the code loader for a freshly read archive
pub trait LoaderFactory: Send + Sync {
    fn create(
        &self,
        path: &Path,
        descriptor: &ModuleDescriptor,
        entry: Arc<dyn ModuleEntry>,
    ) -> Result<Arc<dyn CodeLoader>, HostError>;
}

/// Default factory producing [`ArchiveLoader`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveLoaderFactory;

impl LoaderFactory for ArchiveLoaderFactory {
    fn create(
        &self,
        path: &Path,
        descriptor: &ModuleDescriptor,
        entry: Arc<dyn ModuleEntry>,
    ) -> Result<Arc<dyn CodeLoader>, HostError> {
        Ok(Arc::new(ArchiveLoader::open(path, descriptor.clone(), entry)?))
    }
}
