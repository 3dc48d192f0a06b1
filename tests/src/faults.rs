use modswap_kernel::{
    CodeLoader, CommandDispatcher, CommandTable, EventBus, EventRegistry, HostError,
    HostInternals, LoaderError, ModuleDescriptor, ModuleEntry, ModuleHandle, ModuleHost,
    RegistryAccessError,
};
use modswap_plugins::host::{ArchiveLoader, InMemoryHost, LoaderFactory};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An [`InMemoryHost`] whose internals can be made unreachable
pub struct FaultyHost {
    inner: Arc<InMemoryHost>,
    internals_broken: AtomicBool,
    listeners_hidden: AtomicBool,
}

impl FaultyHost {
    pub fn new(inner: InMemoryHost) -> Self {
        Self {
            inner: Arc::new(inner),
            internals_broken: AtomicBool::new(false),
            listeners_hidden: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryHost> {
        &self.inner
    }

    /// Make [`ModuleHost::internals`] fail from now on
    pub fn break_internals(&self, broken: bool) {
        self.internals_broken.store(broken, Ordering::SeqCst);
    }

    /// Stop exposing the subscriber table
    pub fn hide_listeners(&self, hidden: bool) {
        self.listeners_hidden.store(hidden, Ordering::SeqCst);
    }
}

impl ModuleHost for FaultyHost {
    fn list_loaded_modules(&self) -> Vec<ModuleHandle> {
        self.inner.list_loaded_modules()
    }

    fn get_module(&self, name: &str) -> Option<ModuleHandle> {
        self.inner.get_module(name)
    }

    fn module_descriptor_from_archive(&self, path: &Path) -> Result<ModuleDescriptor, HostError> {
        self.inner.module_descriptor_from_archive(path)
    }

    fn load_module_from_file(&self, path: &Path) -> Result<ModuleHandle, HostError> {
        self.inner.load_module_from_file(path)
    }

    fn initialize_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        self.inner.initialize_module(module)
    }

    fn enable_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        self.inner.enable_module(module)
    }

    fn disable_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        self.inner.disable_module(module)
    }

    fn command_table(&self) -> Arc<dyn CommandTable> {
        self.inner.command_table()
    }

    fn command_dispatcher(&self) -> Option<Arc<dyn CommandDispatcher>> {
        self.inner.command_dispatcher()
    }

    fn event_bus(&self) -> Arc<dyn EventBus> {
        self.inner.event_bus()
    }

    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>> {
        if self.listeners_hidden.load(Ordering::SeqCst) {
            None
        } else {
            self.inner.event_registry()
        }
    }

    fn internals(&self) -> Result<HostInternals, RegistryAccessError> {
        if self.internals_broken.load(Ordering::SeqCst) {
            return Err(RegistryAccessError(
                "module registry layout not recognised".to_string(),
            ));
        }
        self.inner.internals()
    }

    fn reclaim(&self) {
        self.inner.reclaim()
    }
}

/// Produces archive loaders whose detach step always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FlakyLoaderFactory;

impl LoaderFactory for FlakyLoaderFactory {
    fn create(
        &self,
        path: &Path,
        descriptor: &ModuleDescriptor,
        entry: Arc<dyn ModuleEntry>,
    ) -> Result<Arc<dyn CodeLoader>, HostError> {
        let inner = ArchiveLoader::open(path, descriptor.clone(), entry)?;
        Ok(Arc::new(FlakyLoader { inner }))
    }
}

struct FlakyLoader {
    inner: ArchiveLoader,
}

impl CodeLoader for FlakyLoader {
    fn entry(&self) -> Option<Arc<dyn ModuleEntry>> {
        self.inner.entry()
    }

    fn init_metadata(&self) -> Option<ModuleDescriptor> {
        self.inner.init_metadata()
    }

    fn detach(&self) -> Result<(), LoaderError> {
        Err(LoaderError::Detach("back-reference is read-only".to_string()))
    }

    fn close(&self) -> Result<(), LoaderError> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
