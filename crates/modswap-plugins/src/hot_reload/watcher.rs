//! Module directory watch loop
//!
//! Polls the module directory on three independent timers:
//!
//! - auto-load: archives that are not tracked yet are loaded
//! - auto-unload: tracked archives that disappeared have their module unloaded
//! - auto-reload: tracked archives whose content hash changed are reloaded
//!
//! Ticks of one timer never overlap. Ignored modules are left untouched.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use parking_lot::Mutex;

use super::loader::calculate_hash;
use super::manager::LifecycleManager;

/// The three watch-loop timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTimer {
    AutoLoad,
    AutoUnload,
    AutoReload,
}

impl std::fmt::Display for WatchTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchTimer::AutoLoad => write!(f, "auto-load"),
            WatchTimer::AutoUnload => write!(f, "auto-unload"),
            WatchTimer::AutoReload => write!(f, "auto-reload"),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Modules loaded, unloaded or reloaded
    pub acted_on: Vec<String>,
    /// Files whose tracking record was dropped without touching a module
    pub forgotten: Vec<String>,
    /// Modules left alone because they are ignored
    pub ignored: Vec<String>,
    /// Modules or files the operation failed for
    pub failed: Vec<String>,
}

/// Outcome of a tick request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickSummary),
    /// Another tick of the same timer was still running
    Skipped,
}

impl TickOutcome {
    pub fn summary(&self) -> Option<&TickSummary> {
        match self {
            TickOutcome::Completed(summary) => Some(summary),
            TickOutcome::Skipped => None,
        }
    }
}

/// Releases a timer's busy flag when the tick ends
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

/// Background scanner driving automatic load, unload and reload
pub struct WatchLoop {
    manager: Arc<LifecycleManager>,
    load_busy: AtomicBool,
    unload_busy: AtomicBool,
    reload_busy: AtomicBool,
    warned: AtomicBool,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WatchLoop {
    pub fn new(manager: Arc<LifecycleManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            load_busy: AtomicBool::new(false),
            unload_busy: AtomicBool::new(false),
            reload_busy: AtomicBool::new(false),
            warned: AtomicBool::new(false),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Record every archive whose module is already loaded, so auto-load
    /// does not try to load it a second time
    pub fn prime(&self) -> usize {
        let Ok(files) = self.manager.locator().eligible_files() else {
            return 0;
        };
        let tracker = self.manager.tracker();

        let mut primed = 0;
        for path in files {
            let Some(file) = file_name(&path) else {
                continue;
            };
            if tracker.is_tracked(&file) {
                continue;
            }
            let descriptor = match self.manager.host().module_descriptor_from_archive(&path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!("Not priming {}: {}", file, e);
                    continue;
                }
            };
            let Some(module) = self.manager.find(&descriptor.name) else {
                continue;
            };
            match calculate_hash(&path) {
                Ok(hash) => {
                    tracker.record(&file, &hash, Some(module.name()));
                    primed += 1;
                }
                Err(e) => warn!("Could not hash {:?}: {}", path, e),
            }
        }
        debug!("Primed {} tracking record(s)", primed);
        primed
    }

    /// Start the enabled timers, returning how many were started.
    /// Nothing starts when the configuration is invalid.
    pub fn start(self: &Arc<Self>) -> usize {
        let config = self.manager.config().clone();
        if let Err(e) = config.validate() {
            error!("Not starting the watch loop: {}", e);
            return 0;
        }
        let timers: Vec<(WatchTimer, Duration)> = [
            (WatchTimer::AutoLoad, &config.auto_load),
            (WatchTimer::AutoUnload, &config.auto_unload),
            (WatchTimer::AutoReload, &config.auto_reload),
        ]
        .into_iter()
        .filter(|(_, timer)| timer.enabled)
        .map(|(kind, timer)| (kind, timer.interval()))
        .collect();

        if timers.is_empty() || self.is_running() {
            return 0;
        }

        if !self.warned.swap(true, Ordering::AcqRel) {
            warn!("!!! Automatic load/unload/reload can break modules, use with caution !!!");
            warn!("If anything breaks, a restart will probably fix it");
        }

        self.prime();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let mut tasks = self.tasks.lock();
        for (kind, period) in &timers {
            tasks.push(self.spawn_timer(*kind, *period, shutdown_rx.clone()));
        }

        info!("Watch loop started with {} timer(s)", timers.len());
        timers.len()
    }

    fn spawn_timer(
        self: &Arc<Self>,
        kind: WatchTimer,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if this.run_tick(kind).await == TickOutcome::Skipped {
                            debug!("{} tick skipped, previous one still running", kind);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("{} timer shutting down", kind);
                        break;
                    }
                }
            }
        })
    }

    /// Stop every timer and wait for them to finish
    pub async fn stop(&self) {
        let Some(tx) = self.shutdown_tx.lock().take() else {
            return;
        };
        info!("Stopping watch loop");
        let _ = tx.send(true);

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Watch loop task failed: {}", e);
            }
        }
    }

    pub async fn run_tick(&self, kind: WatchTimer) -> TickOutcome {
        match kind {
            WatchTimer::AutoLoad => self.run_auto_load_tick().await,
            WatchTimer::AutoUnload => self.run_auto_unload_tick().await,
            WatchTimer::AutoReload => self.run_auto_reload_tick().await,
        }
    }

    /// Load archives that are not tracked yet. The hash is recorded
    /// whatever the load outcome, so a broken archive is tried once.
    pub async fn run_auto_load_tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::try_enter(&self.load_busy) else {
            return TickOutcome::Skipped;
        };
        let mut summary = TickSummary::default();
        let Ok(files) = self.manager.locator().eligible_files() else {
            return TickOutcome::Completed(summary);
        };
        let tracker = self.manager.tracker().clone();

        for path in files {
            let Some(file) = file_name(&path) else {
                continue;
            };
            if tracker.is_tracked(&file) {
                continue;
            }
            let hash = match calculate_hash(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Could not hash {:?}: {}", path, e);
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.manager.load(&stem).await {
                Ok(module) => {
                    info!("Auto-loaded {} from {}", module.name(), file);
                    summary.acted_on.push(module.name().to_string());
                }
                Err(e) => {
                    warn!("Auto-load of {} failed: {}", file, e);
                    summary.failed.push(file.clone());
                }
            }
            tracker.set_hash(&file, &hash);
        }

        TickOutcome::Completed(summary)
    }

    /// Unload modules whose archive disappeared
    pub async fn run_auto_unload_tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::try_enter(&self.unload_busy) else {
            return TickOutcome::Skipped;
        };
        let mut summary = TickSummary::default();
        if !self.manager.locator().dir_exists() {
            return TickOutcome::Completed(summary);
        }
        let tracker = self.manager.tracker().clone();
        let dir = self.manager.locator().dir().to_path_buf();

        for file in tracker.files() {
            if dir.join(&file).exists() {
                continue;
            }

            let module = tracker
                .module_name(&file)
                .and_then(|name| self.manager.find(&name));
            let Some(module) = module else {
                debug!("{} is gone and its module is not loaded, forgetting it", file);
                tracker.forget(&file);
                summary.forgotten.push(file);
                continue;
            };
            if self.manager.is_ignored(module.name()) {
                summary.ignored.push(module.name().to_string());
                continue;
            }

            tracker.forget(&file);
            match self.manager.unload(&module).await {
                Ok(report) => {
                    info!("Auto-unloaded {} ({} removed)", module.name(), file);
                    summary.acted_on.push(report.module);
                }
                Err(e) => {
                    warn!("Auto-unload of {} failed: {}", module.name(), e);
                    summary.failed.push(module.name().to_string());
                }
            }
        }

        TickOutcome::Completed(summary)
    }

    /// Reload modules whose archive content changed
    pub async fn run_auto_reload_tick(&self) -> TickOutcome {
        let Some(_guard) = TickGuard::try_enter(&self.reload_busy) else {
            return TickOutcome::Skipped;
        };
        let mut summary = TickSummary::default();
        let Ok(files) = self.manager.locator().eligible_files() else {
            return TickOutcome::Completed(summary);
        };
        let tracker = self.manager.tracker().clone();

        for path in files {
            let Some(file) = file_name(&path) else {
                continue;
            };
            let Some(old_hash) = tracker.hash(&file) else {
                continue;
            };
            let hash = match calculate_hash(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Could not hash {:?}: {}", path, e);
                    continue;
                }
            };
            if hash.eq_ignore_ascii_case(&old_hash) {
                continue;
            }

            let module = tracker
                .module_name(&file)
                .and_then(|name| self.manager.find(&name));
            let Some(module) = module else {
                // retried on the next tick
                debug!("{} changed but its module is not loaded", file);
                continue;
            };
            if self.manager.is_ignored(module.name()) {
                summary.ignored.push(module.name().to_string());
                continue;
            }

            tracker.set_hash(&file, &hash);
            match self.manager.reload(&module).await {
                Ok(fresh) => {
                    info!("Auto-reloaded {}", fresh.descriptor().full_name());
                    summary.acted_on.push(fresh.name().to_string());
                }
                Err(e) => {
                    warn!("Auto-reload of {} failed: {}", module.name(), e);
                    summary.failed.push(module.name().to_string());
                }
            }
        }

        TickOutcome::Completed(summary)
    }
}
