//! Module lifecycle manager
//!
//! Orchestrates loading, unloading and reloading modules in a running host.
//! An unload always runs the same steps, in this order:
//!
//! 1. negotiate with the module's gentle-unload hook (may veto)
//! 2. locate the host's internal registries
//! 3. unwrap the module's commands (convention tier)
//! 4. disable the module
//! 5. detach it from the module registry, the event tables and any
//!    command entry still attributed to it
//! 6. tear its code loader down
//! 7. ask the host to reclaim memory
//!
//! Only steps 1 and 2 can abort the call. Once step 3 started nothing is
//! rolled back: later failures are reported as [`UnloadWarning`]s.

use modswap_kernel::config::ModswapConfig;
use modswap_kernel::{HostError, ModuleHandle, ModuleHost, RegistryAccessError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::api::ExtensionApi;
use super::commands::{CommandReconciler, OwnerResolver};
use super::events::{EventPurger, PurgeOutcome};
use super::gentle::GentleUnloadRegistry;
use super::ignore::IgnoreList;
use super::loader::{LocateError, ModuleLocator, calculate_hash};
use super::registry::RegistrySync;
use super::state::FileTracker;
use super::status::{BulkReport, StatusMessage};
use super::teardown::LoaderTeardown;

/// Errors that abort a lifecycle operation
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Module directory does not exist: {0}")]
    DirectoryMissing(PathBuf),

    #[error("No module named {0} found in the module directory")]
    NotFound(String),

    #[error("Invalid descriptor in {path}: {source}")]
    DescriptorInvalid {
        path: PathBuf,
        #[source]
        source: HostError,
    },

    #[error("Host refused to load {path}: {source}")]
    LoadRejected {
        path: PathBuf,
        #[source]
        source: HostError,
    },

    #[error("{0} refused to be unloaded")]
    UnloadVetoed(String),

    #[error("Cannot reach the host registries while unloading {module}: {source}")]
    RegistryAccess {
        module: String,
        #[source]
        source: RegistryAccessError,
    },

    #[error("Module {0} is not loaded")]
    NotLoaded(String),

    #[error("Failed to enable {module}: {source}")]
    EnableFailed {
        module: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to disable {module}: {source}")]
    DisableFailed {
        module: String,
        #[source]
        source: HostError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LocateError> for LifecycleError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::DirectoryMissing(dir) => LifecycleError::DirectoryMissing(dir),
            LocateError::NotFound(name) => LifecycleError::NotFound(name),
            LocateError::Io(e) => LifecycleError::Io(e),
        }
    }
}

/// Non-fatal problems met during an unload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnloadWarning {
    /// The module is out of every registry but its loader did not shut down cleanly
    #[error("loader teardown incomplete: {0}")]
    PartialTeardown(String),

    #[error("listener table unreachable, event subscriptions were left in place")]
    ListenersUnreachable,

    /// A command whose backing code was already gone was force-removed
    #[error("removed stale command '{0}'")]
    StaleCommandEntry(String),

    #[error("disable hook failed: {0}")]
    DisableFailed(String),

    #[error("registry detach failed: {0}")]
    RegistryDetach(String),
}

/// What an unload did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadReport {
    pub module: String,
    pub version: String,
    /// Command aliases removed from the flat table or the tree
    pub commands_removed: Vec<String>,
    pub subscriptions_purged: usize,
    pub warnings: Vec<UnloadWarning>,
}

impl UnloadReport {
    fn new(module: &str, version: &str) -> Self {
        Self {
            module: module.to_string(),
            version: version.to_string(),
            commands_removed: Vec::new(),
            subscriptions_purged: 0,
            warnings: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn to_status(&self) -> StatusMessage {
        if self.is_clean() {
            StatusMessage::success(format!("{} has been unloaded", self.module))
        } else {
            StatusMessage::partial(format!(
                "{} has been unloaded with warnings: {}",
                self.module,
                self.warning_text()
            ))
        }
    }

    fn warning_text(&self) -> String {
        self.warnings
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Which modules [`LifecycleManager::module_names`] lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleFilter {
    #[default]
    All,
    Enabled,
    Disabled,
}

/// Loads, unloads and reloads modules in a host that only knows how to load
pub struct LifecycleManager {
    host: Arc<dyn ModuleHost>,
    config: ModswapConfig,
    locator: ModuleLocator,
    commands: CommandReconciler,
    events: EventPurger,
    teardown: LoaderTeardown,
    gentle: Arc<GentleUnloadRegistry>,
    ignore: Arc<IgnoreList>,
    tracker: Arc<FileTracker>,
    pending_syncs: Mutex<Vec<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(host: Arc<dyn ModuleHost>, config: ModswapConfig) -> Self {
        let commands = CommandReconciler::new(
            host.command_table(),
            host.command_dispatcher(),
            config.structural_owner_lookup,
        );

        Self {
            locator: ModuleLocator::new(&config.module_dir, &config.extension),
            events: EventPurger::new(host.clone()),
            gentle: Arc::new(GentleUnloadRegistry::new(config.negotiation_timeout())),
            ignore: Arc::new(IgnoreList::new(config.ignored_modules.iter().cloned())),
            tracker: Arc::new(FileTracker::new()),
            teardown: LoaderTeardown,
            pending_syncs: Mutex::new(Vec::new()),
            commands,
            host,
            config,
        }
    }

    /// Use a custom owner resolver for the full command sweep
    pub fn with_resolver(mut self, resolver: Arc<dyn OwnerResolver>) -> Self {
        self.commands = self.commands.with_resolver(resolver);
        self
    }

    pub fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.host
    }

    pub fn config(&self) -> &ModswapConfig {
        &self.config
    }

    pub fn locator(&self) -> &ModuleLocator {
        &self.locator
    }

    pub fn tracker(&self) -> &Arc<FileTracker> {
        &self.tracker
    }

    pub fn ignore_list(&self) -> &Arc<IgnoreList> {
        &self.ignore
    }

    pub fn gentle_unload(&self) -> &Arc<GentleUnloadRegistry> {
        &self.gentle
    }

    pub fn commands(&self) -> &CommandReconciler {
        &self.commands
    }

    /// API handle modules use to talk back to the manager
    pub fn extension_api(&self) -> ExtensionApi {
        ExtensionApi::new(self.gentle.clone(), self.ignore.clone())
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }

    // ------------------------------------------------------------------
    // load
    // ------------------------------------------------------------------

    /// Load the module called `name` from the module directory and enable it.
    ///
    /// A failing load or enable hook is logged; the module then stays
    /// registered, disabled, and is still returned.
    pub async fn load(&self, name: &str) -> Result<ModuleHandle, LifecycleError> {
        info!("Loading module {}", name);

        let path = self.locator.resolve(self.host.as_ref(), name)?;
        self.load_path(&path).await
    }

    /// Load and enable the module stored in the archive at `path`
    pub async fn load_path(&self, path: &Path) -> Result<ModuleHandle, LifecycleError> {
        let path = path.to_path_buf();

        self.host
            .module_descriptor_from_archive(&path)
            .map_err(|source| LifecycleError::DescriptorInvalid {
                path: path.clone(),
                source,
            })?;

        let module = self
            .host
            .load_module_from_file(&path)
            .map_err(|source| LifecycleError::LoadRejected {
                path: path.clone(),
                source,
            })?;

        match self.host.initialize_module(&module) {
            Ok(()) => {
                if let Err(e) = self.host.enable_module(&module) {
                    warn!("{} was loaded but could not be enabled: {}", module.name(), e);
                }
            }
            Err(e) => warn!("{} was loaded but failed to initialize: {}", module.name(), e),
        }

        self.track(&path, &module);
        self.schedule_command_sync(&module);

        info!("Loaded {} from {:?}", module.descriptor().full_name(), path);
        Ok(module)
    }

    fn track(&self, path: &Path, module: &ModuleHandle) {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        match calculate_hash(path) {
            Ok(hash) => self.tracker.record(file_name, &hash, Some(module.name())),
            Err(e) => warn!("Could not hash {:?}: {}", path, e),
        }
    }

    /// Mirror the module's commands into the command tree after the
    /// configured delay
    fn schedule_command_sync(&self, module: &ModuleHandle) {
        if !self.commands.has_tree() {
            return;
        }

        let reconciler = self.commands.clone();
        let host = self.host.clone();
        let module = module.clone();
        let delay = self.config.command_sync_delay();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_loaded = host
                .get_module(module.name())
                .is_some_and(|current| current.id() == module.id());
            if still_loaded {
                reconciler.wrap(&module);
            } else {
                debug!("Skipping command sync of {}: no longer loaded", module.name());
            }
        });

        let mut pending = self.pending_syncs.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait until every scheduled command sync ran
    pub async fn wait_for_command_sync(&self) {
        let handles = std::mem::take(&mut *self.pending_syncs.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Command sync task failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // unload
    // ------------------------------------------------------------------

    /// Take a module out of the host.
    ///
    /// Unloading a module that is already gone succeeds and changes nothing.
    pub async fn unload(&self, module: &ModuleHandle) -> Result<UnloadReport, LifecycleError> {
        let name = module.name().to_string();
        info!("Unloading module {}", name);

        if !self.gentle.negotiate(module.id()).await {
            warn!("Unload of {} was vetoed", name);
            return Err(LifecycleError::UnloadVetoed(name));
        }

        let internals = self.host.internals().map_err(|source| {
            error!("Cannot unload {}: {}", name, source);
            LifecycleError::RegistryAccess {
                module: name.clone(),
                source,
            }
        })?;

        let mut report = UnloadReport::new(&name, module.version());

        let unwrapped = self.commands.unwrap(module);
        report.commands_removed.extend(unwrapped.removed);
        report
            .warnings
            .extend(unwrapped.stale.into_iter().map(UnloadWarning::StaleCommandEntry));

        if let Err(e) = self.host.disable_module(module) {
            warn!("Disabling {} failed: {}", name, e);
            report.warnings.push(UnloadWarning::DisableFailed(e.to_string()));
        }

        if let Err(e) = RegistrySync::detach(&internals, module) {
            error!("Detaching {} from the module registry failed: {}", name, e);
            report.warnings.push(UnloadWarning::RegistryDetach(e.to_string()));
        }

        match self.events.purge(module.id()) {
            PurgeOutcome::Purged(count) => report.subscriptions_purged = count,
            PurgeOutcome::Unreachable => report.warnings.push(UnloadWarning::ListenersUnreachable),
        }

        let swept = self.commands.sweep(module);
        for alias in swept.removed {
            if !report.commands_removed.contains(&alias) {
                report.commands_removed.push(alias);
            }
        }
        report
            .warnings
            .extend(swept.stale.into_iter().map(UnloadWarning::StaleCommandEntry));

        report.warnings.extend(
            self.teardown
                .run(module)
                .into_iter()
                .map(|e| UnloadWarning::PartialTeardown(e.to_string())),
        );

        self.host.reclaim();

        if report.is_clean() {
            info!(
                "Unloaded {} ({} command(s), {} subscription(s))",
                name,
                report.commands_removed.len(),
                report.subscriptions_purged
            );
        } else {
            warn!("Unloaded {} with warnings: {}", name, report.warning_text());
        }
        Ok(report)
    }

    /// Unload the module called `name`
    pub async fn unload_by_name(&self, name: &str) -> Result<UnloadReport, LifecycleError> {
        let module = self.require(name)?;
        self.unload(&module).await
    }

    // ------------------------------------------------------------------
    // reload
    // ------------------------------------------------------------------

    /// Unload, then load again from the same archive. When that archive is
    /// gone or now declares another module, the name is resolved afresh.
    /// A failed unload aborts before loading.
    pub async fn reload(&self, module: &ModuleHandle) -> Result<ModuleHandle, LifecycleError> {
        self.reload_with_report(module)
            .await
            .map(|(module, _)| module)
    }

    pub async fn reload_by_name(&self, name: &str) -> Result<ModuleHandle, LifecycleError> {
        let module = self.require(name)?;
        self.reload(&module).await
    }

    async fn reload_with_report(
        &self,
        module: &ModuleHandle,
    ) -> Result<(ModuleHandle, UnloadReport), LifecycleError> {
        let name = module.name().to_string();
        let path = module.path().to_path_buf();
        let report = self.unload(module).await?;

        let same_file = path.is_file()
            && self
                .host
                .module_descriptor_from_archive(&path)
                .is_ok_and(|descriptor| descriptor.is_named(&name));
        let fresh = if same_file {
            self.load_path(&path).await?
        } else {
            debug!("{:?} no longer holds {}, resolving by name", path, name);
            self.load(&name).await?
        };
        Ok((fresh, report))
    }

    // ------------------------------------------------------------------
    // enable / disable
    // ------------------------------------------------------------------

    pub async fn enable(&self, name: &str) -> Result<ModuleHandle, LifecycleError> {
        let module = self.require(name)?;
        self.host
            .enable_module(&module)
            .map_err(|source| LifecycleError::EnableFailed {
                module: module.name().to_string(),
                source,
            })?;
        self.schedule_command_sync(&module);
        Ok(module)
    }

    pub async fn disable(&self, name: &str) -> Result<ModuleHandle, LifecycleError> {
        let module = self.require(name)?;
        self.host
            .disable_module(&module)
            .map_err(|source| LifecycleError::DisableFailed {
                module: module.name().to_string(),
                source,
            })?;
        Ok(module)
    }

    // ------------------------------------------------------------------
    // bulk operations
    // ------------------------------------------------------------------

    /// Load every eligible archive whose module is not loaded yet
    pub async fn load_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        let files = match self.locator.eligible_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot list module directory: {}", e);
                return report;
            }
        };

        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let descriptor = match self.host.module_descriptor_from_archive(&path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    report.push(&file_name, StatusMessage::failure(e.to_string()));
                    continue;
                }
            };
            if self.find(&descriptor.name).is_some() {
                continue;
            }
            if self.is_ignored(&descriptor.name) {
                report.ignored.push(descriptor.name);
                continue;
            }

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let status = Self::load_outcome(self.load(&stem).await);
            report.push(&descriptor.name, status);
        }

        report
    }

    pub async fn unload_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for module in self.host.list_loaded_modules() {
            if self.is_ignored(module.name()) {
                report.ignored.push(module.name().to_string());
                continue;
            }
            let status = match self.unload(&module).await {
                Ok(unload) => unload.to_status(),
                Err(e) => StatusMessage::failure(e.to_string()),
            };
            report.push(module.name(), status);
        }
        report
    }

    pub async fn reload_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for module in self.host.list_loaded_modules() {
            if self.is_ignored(module.name()) {
                report.ignored.push(module.name().to_string());
                continue;
            }
            let status = Self::reload_outcome(module.name(), self.reload_with_report(&module).await);
            report.push(module.name(), status);
        }
        report
    }

    pub async fn enable_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for module in self.host.list_loaded_modules() {
            if self.is_ignored(module.name()) {
                report.ignored.push(module.name().to_string());
                continue;
            }
            let status = match self.enable(module.name()).await {
                Ok(m) => StatusMessage::success(format!("{} has been enabled", m.descriptor().full_name())),
                Err(e) => StatusMessage::failure(e.to_string()),
            };
            report.push(module.name(), status);
        }
        report
    }

    pub async fn disable_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for module in self.host.list_loaded_modules() {
            if self.is_ignored(module.name()) {
                report.ignored.push(module.name().to_string());
                continue;
            }
            let status = match self.disable(module.name()).await {
                Ok(m) => StatusMessage::success(format!("{} has been disabled", m.descriptor().full_name())),
                Err(e) => StatusMessage::failure(e.to_string()),
            };
            report.push(module.name(), status);
        }
        report
    }

    // ------------------------------------------------------------------
    // status wrappers
    // ------------------------------------------------------------------

    pub async fn load_status(&self, name: &str) -> StatusMessage {
        Self::load_outcome(self.load(name).await)
    }

    pub async fn unload_status(&self, name: &str) -> StatusMessage {
        match self.unload_by_name(name).await {
            Ok(report) => report.to_status(),
            Err(e) => StatusMessage::failure(e.to_string()),
        }
    }

    pub async fn reload_status(&self, name: &str) -> StatusMessage {
        let module = match self.require(name) {
            Ok(module) => module,
            Err(e) => return StatusMessage::failure(e.to_string()),
        };
        Self::reload_outcome(module.name(), self.reload_with_report(&module).await)
    }

    pub async fn enable_status(&self, name: &str) -> StatusMessage {
        match self.enable(name).await {
            Ok(m) => StatusMessage::success(format!("{} has been enabled", m.descriptor().full_name())),
            Err(e) => StatusMessage::failure(e.to_string()),
        }
    }

    pub async fn disable_status(&self, name: &str) -> StatusMessage {
        match self.disable(name).await {
            Ok(m) => StatusMessage::success(format!("{} has been disabled", m.descriptor().full_name())),
            Err(e) => StatusMessage::failure(e.to_string()),
        }
    }

    fn load_outcome(result: Result<ModuleHandle, LifecycleError>) -> StatusMessage {
        match result {
            Ok(m) if m.is_enabled() => {
                StatusMessage::success(format!("{} has been loaded and enabled", m.descriptor().full_name()))
            }
            Ok(m) => StatusMessage::partial(format!(
                "{} has been loaded but is not enabled, see the log",
                m.descriptor().full_name()
            )),
            Err(e) => StatusMessage::failure(e.to_string()),
        }
    }

    fn reload_outcome(
        name: &str,
        result: Result<(ModuleHandle, UnloadReport), LifecycleError>,
    ) -> StatusMessage {
        match result {
            Ok((m, report)) if report.is_clean() && m.is_enabled() => {
                StatusMessage::success(format!("{} has been reloaded", m.descriptor().full_name()))
            }
            Ok((m, report)) if report.is_clean() => StatusMessage::partial(format!(
                "{} has been reloaded but is not enabled",
                m.descriptor().full_name()
            )),
            Ok((m, report)) => StatusMessage::partial(format!(
                "{} has been reloaded with warnings: {}",
                m.descriptor().full_name(),
                report.warning_text()
            )),
            Err(e) => StatusMessage::failure(format!("Reloading {} failed: {}", name, e)),
        }
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Loaded modules, in registration order
    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.host.list_loaded_modules()
    }

    /// Case-insensitive lookup
    pub fn find(&self, name: &str) -> Option<ModuleHandle> {
        self.host.get_module(name)
    }

    fn require(&self, name: &str) -> Result<ModuleHandle, LifecycleError> {
        self.find(name)
            .ok_or_else(|| LifecycleError::NotLoaded(name.to_string()))
    }

    /// Names of loaded modules, optionally with their versions
    pub fn module_names(&self, filter: ModuleFilter, include_versions: bool) -> Vec<String> {
        self.modules()
            .into_iter()
            .filter(|m| match filter {
                ModuleFilter::All => true,
                ModuleFilter::Enabled => m.is_enabled(),
                ModuleFilter::Disabled => !m.is_enabled(),
            })
            .map(|m| {
                if include_versions {
                    m.descriptor().full_name()
                } else {
                    m.name().to_string()
                }
            })
            .collect()
    }

    /// Commands registered under the module's `"<name>:"` namespace
    pub fn usages(&self, name: &str) -> Result<Vec<String>, LifecycleError> {
        let module = self.require(name)?;
        let mut commands: Vec<String> = self
            .host
            .command_table()
            .entries()
            .into_iter()
            .filter(|entry| {
                entry
                    .namespace()
                    .is_some_and(|ns| ns.eq_ignore_ascii_case(module.name()))
            })
            .map(|entry| entry.command().to_string())
            .collect();
        commands.sort();
        commands.dedup();
        Ok(commands)
    }

    /// Names of the modules providing `command`
    pub fn find_by_command(&self, command: &str) -> Vec<String> {
        let modules = self.modules();
        let mut owners: Vec<String> = Vec::new();

        for entry in self.host.command_table().entries() {
            if !entry.command().eq_ignore_ascii_case(command) {
                continue;
            }
            let owner = match entry.handler.owner() {
                Some(id) => modules.iter().find(|m| m.id() == id).cloned(),
                None => entry.namespace().and_then(|ns| self.find(ns)),
            };
            if let Some(owner) = owner {
                if !owners.iter().any(|n| n == owner.name()) {
                    owners.push(owner.name().to_string());
                }
            }
        }

        owners.sort();
        owners
    }

    /// Report and repair one-sided module registry entries
    pub fn repair_registry(&self) -> Result<usize, LifecycleError> {
        let internals = self
            .host
            .internals()
            .map_err(|source| LifecycleError::RegistryAccess {
                module: "*".to_string(),
                source,
            })?;
        let repaired = RegistrySync::repair(&internals).map_err(|source| {
            LifecycleError::RegistryAccess {
                module: "*".to_string(),
                source,
            }
        })?;
        if repaired > 0 {
            info!("Repaired {} registry entr(ies)", repaired);
        }
        Ok(repaired)
    }

    /// Stop pending command syncs and drop the ignore list
    pub fn shutdown(&self) {
        for handle in self.pending_syncs.lock().drain(..) {
            handle.abort();
        }
        self.ignore.clear();
        info!("Lifecycle manager shut down");
    }
}
