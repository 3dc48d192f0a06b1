//! Reference in-memory host
//!
//! [`InMemoryHost`] behaves the way a typical plugin host does: it can load
//! a module from an archive, run its hooks, register the commands its
//! descriptor declares and dispatch events, but it has no unload of its own.
//! Its internal tables are reachable through the capability traits so the
//! lifecycle manager can take modules out again.

mod archive;
mod handler;
mod tables;

pub use archive::{
    ArchiveLoader, ArchiveLoaderFactory, DESCRIPTOR_ENTRY, LoaderFactory, read_descriptor,
    write_archive, write_raw_archive,
};
pub use handler::ModuleCommand;
pub use tables::{CommandTree, FlatCommandTable, ModuleTable, SubscriberTable};

use modswap_kernel::{
    CommandDispatcher, CommandTable, DeclarativeModule, EventBus, EventRegistry, HostError,
    HostInternals, Module, ModuleContext, ModuleDescriptor, ModuleEntry, ModuleHandle, ModuleHost,
    ModuleRegistry, RegistryAccessError, namespaced_alias,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Host API version modules may declare at most
pub const CURRENT_API_VERSION: u32 = 1;

/// Builds a fresh module instance for a registered entry point
pub type EntryPointFactory = Arc<dyn Fn() -> Arc<dyn ModuleEntry> + Send + Sync>;

/// Builder for [`InMemoryHost`]
pub struct InMemoryHostBuilder {
    tree_dispatcher: bool,
    expose_listeners: bool,
    entry_points: HashMap<String, EntryPointFactory>,
    loader_factory: Arc<dyn LoaderFactory>,
}

impl Default for InMemoryHostBuilder {
    fn default() -> Self {
        Self {
            tree_dispatcher: true,
            expose_listeners: true,
            entry_points: HashMap::new(),
            loader_factory: Arc::new(ArchiveLoaderFactory),
        }
    }
}

impl InMemoryHostBuilder {
    /// Keep a command tree next to the flat table
    pub fn with_tree_dispatcher(mut self, enabled: bool) -> Self {
        self.tree_dispatcher = enabled;
        self
    }

    /// Expose the internal subscriber table through [`ModuleHost::event_registry`]
    pub fn with_listener_table(mut self, exposed: bool) -> Self {
        self.expose_listeners = exposed;
        self
    }

    /// Register an entry point under the name descriptors refer to in `main`
    pub fn with_entry_point<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ModuleEntry> + Send + Sync + 'static,
    {
        self.entry_points.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn with_loader_factory(mut self, factory: Arc<dyn LoaderFactory>) -> Self {
        self.loader_factory = factory;
        self
    }

    pub fn build(self) -> InMemoryHost {
        InMemoryHost {
            modules: Arc::new(ModuleTable::new()),
            commands: Arc::new(FlatCommandTable::new()),
            tree: self.tree_dispatcher.then(|| Arc::new(CommandTree::new())),
            events: Arc::new(SubscriberTable::new()),
            expose_listeners: self.expose_listeners,
            entry_points: RwLock::new(self.entry_points),
            loader_factory: self.loader_factory,
            reclaims: AtomicU64::new(0),
        }
    }
}

/// A module host keeping everything in memory
pub struct InMemoryHost {
    modules: Arc<ModuleTable>,
    commands: Arc<FlatCommandTable>,
    tree: Option<Arc<CommandTree>>,
    events: Arc<SubscriberTable>,
    expose_listeners: bool,
    entry_points: RwLock<HashMap<String, EntryPointFactory>>,
    loader_factory: Arc<dyn LoaderFactory>,
    reclaims: AtomicU64,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryHostBuilder {
        InMemoryHostBuilder::default()
    }

    /// Register an entry point after construction
    pub fn register_entry_point<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn ModuleEntry> + Send + Sync + 'static,
    {
        self.entry_points
            .write()
            .insert(name.to_string(), Arc::new(factory));
    }

    pub fn module_table(&self) -> &Arc<ModuleTable> {
        &self.modules
    }

    pub fn flat_commands(&self) -> &Arc<FlatCommandTable> {
        &self.commands
    }

    pub fn tree(&self) -> Option<&Arc<CommandTree>> {
        self.tree.as_ref()
    }

    pub fn subscribers(&self) -> &Arc<SubscriberTable> {
        &self.events
    }

    /// How many times [`ModuleHost::reclaim`] was called
    pub fn reclaim_count(&self) -> u64 {
        self.reclaims.load(Ordering::Acquire)
    }

    fn context(&self, module: &ModuleHandle) -> ModuleContext {
        ModuleContext {
            module: module.clone(),
            commands: self.command_table(),
            events: self.event_bus(),
        }
    }

    fn instantiate(&self, descriptor: &ModuleDescriptor) -> Result<Arc<dyn ModuleEntry>, HostError> {
        match &descriptor.main {
            Some(main) => {
                let factory = self
                    .entry_points
                    .read()
                    .get(main)
                    .cloned()
                    .ok_or_else(|| HostError::UnknownEntryPoint(main.clone()))?;
                Ok(factory())
            }
            None => Ok(Arc::new(DeclarativeModule)),
        }
    }

    fn run_hook(
        &self,
        module: &ModuleHandle,
        hook: &'static str,
        call: impl FnOnce(&dyn ModuleEntry, &ModuleContext) -> Result<(), String>,
    ) -> Result<(), HostError> {
        let entry = module.loader().entry().ok_or_else(|| HostError::Hook {
            module: module.name().to_string(),
            hook,
            reason: "module instance was detached".to_string(),
        })?;
        let ctx = self.context(module);

        let outcome = catch_unwind(AssertUnwindSafe(|| call(entry.as_ref(), &ctx)));
        let reason = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(reason)) => reason,
            Err(payload) => panic_message(payload.as_ref()),
        };

        Err(HostError::Hook {
            module: module.name().to_string(),
            hook,
            reason,
        })
    }

    fn register_declared_commands(&self, module: &ModuleHandle) {
        for (command, spec) in &module.descriptor().commands {
            let handler = Arc::new(ModuleCommand::new(module, command, spec.clone()));
            let mut labels = vec![command.clone()];
            labels.extend(spec.aliases.iter().cloned());

            for label in labels {
                let namespaced = namespaced_alias(module.name(), &label);
                if !self.commands.register(&namespaced, handler.clone()) {
                    warn!("{} could not register {}", module.name(), namespaced);
                }
                if !self.commands.register(&label, handler.clone()) {
                    debug!(
                        "{}: '{}' is taken, only '{}' is available",
                        module.name(),
                        label,
                        namespaced
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

impl ModuleHost for InMemoryHost {
    fn list_loaded_modules(&self) -> Vec<ModuleHandle> {
        self.modules.modules()
    }

    fn get_module(&self, name: &str) -> Option<ModuleHandle> {
        self.modules.lookup(name)
    }

    fn module_descriptor_from_archive(&self, path: &Path) -> Result<ModuleDescriptor, HostError> {
        read_descriptor(path)
    }

    fn load_module_from_file(&self, path: &Path) -> Result<ModuleHandle, HostError> {
        let descriptor = read_descriptor(path)?;

        if let Some(required) = descriptor.api_version {
            if required > CURRENT_API_VERSION {
                return Err(HostError::IncompatibleVersion {
                    supported: CURRENT_API_VERSION,
                    required,
                });
            }
        }

        if self.modules.lookup(&descriptor.name).is_some() {
            return Err(HostError::AlreadyLoaded(descriptor.name));
        }

        let entry = self.instantiate(&descriptor)?;
        let loader = self.loader_factory.create(path, &descriptor, entry)?;
        let module = Arc::new(Module::new(descriptor, path.to_path_buf(), loader));
        self.modules.add(module.clone())?;

        info!("Loaded {} from {:?}", module.descriptor().full_name(), path);
        Ok(module)
    }

    fn initialize_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        self.run_hook(module, "on_load", |entry, ctx| entry.on_load(ctx))
    }

    fn enable_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        if module.is_enabled() {
            return Ok(());
        }

        self.run_hook(module, "on_enable", |entry, ctx| entry.on_enable(ctx))?;
        module.set_enabled(true);
        self.register_declared_commands(module);

        info!("Enabled {}", module.descriptor().full_name());
        Ok(())
    }

    fn disable_module(&self, module: &ModuleHandle) -> Result<(), HostError> {
        if !module.is_enabled() {
            return Ok(());
        }

        let result = self.run_hook(module, "on_disable", |entry, ctx| entry.on_disable(ctx));
        module.set_enabled(false);

        info!("Disabled {}", module.descriptor().full_name());
        result
    }

    fn command_table(&self) -> Arc<dyn CommandTable> {
        self.commands.clone()
    }

    fn command_dispatcher(&self) -> Option<Arc<dyn CommandDispatcher>> {
        self.tree
            .clone()
            .map(|tree| tree as Arc<dyn CommandDispatcher>)
    }

    fn event_bus(&self) -> Arc<dyn EventBus> {
        self.events.clone()
    }

    fn event_registry(&self) -> Option<Arc<dyn EventRegistry>> {
        if self.expose_listeners {
            Some(self.events.clone())
        } else {
            None
        }
    }

    fn internals(&self) -> Result<HostInternals, RegistryAccessError> {
        Ok(HostInternals {
            modules: self.modules.clone(),
        })
    }

    fn reclaim(&self) {
        let count = self.reclaims.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Reclaim requested ({} so far)", count);
    }
}
