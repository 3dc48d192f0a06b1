use async_trait::async_trait;
use modswap_kernel::{
    CodeLoader, CommandHandler, EventSubscription, GentleUnload, HandlerField, InspectError,
    Module, ModuleContext, ModuleEntry, ModuleId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared record of hook calls, as `"<hook>:<module>"`
#[derive(Debug, Clone, Default)]
pub struct HookLog(Arc<Mutex<Vec<String>>>);

impl HookLog {
    pub fn push(&self, hook: &str, module: &str) {
        self.0.lock().push(format!("{}:{}", hook, module));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        let prefix = format!("{}:", hook);
        self.0.lock().iter().filter(|e| e.starts_with(&prefix)).count()
    }
}

/// Module entry that logs its hooks and, once enabled, subscribes to the
/// `tick` and `chat` events and registers an un-namespaced command
pub struct RecordingModule {
    log: HookLog,
    extra_command: Option<String>,
}

impl RecordingModule {
    pub fn new(log: HookLog) -> Self {
        Self {
            log,
            extra_command: None,
        }
    }

    /// Also register `alias` directly in the flat table while enabling
    pub fn with_extra_command(mut self, alias: &str) -> Self {
        self.extra_command = Some(alias.to_string());
        self
    }

    /// Entry-point factory for [`modswap_plugins::host::InMemoryHostBuilder::with_entry_point`]
    pub fn factory(
        log: HookLog,
        extra_command: Option<&str>,
    ) -> impl Fn() -> Arc<dyn ModuleEntry> + Send + Sync + 'static {
        let extra = extra_command.map(str::to_string);
        move || {
            let mut module = RecordingModule::new(log.clone());
            if let Some(alias) = &extra {
                module = module.with_extra_command(alias);
            }
            Arc::new(module) as Arc<dyn ModuleEntry>
        }
    }
}

impl ModuleEntry for RecordingModule {
    fn on_load(&self, ctx: &ModuleContext) -> Result<(), String> {
        self.log.push("load", ctx.module.name());
        Ok(())
    }

    fn on_enable(&self, ctx: &ModuleContext) -> Result<(), String> {
        self.log.push("enable", ctx.module.name());

        for (event_type, priority) in [("tick", 0), ("chat", 10)] {
            ctx.events.subscribe(EventSubscription {
                event_type: event_type.to_string(),
                priority,
                owner: ctx.module.id(),
                handler: Arc::new(|_: &str, _: &serde_json::Value| {}),
            });
        }

        if let Some(alias) = &self.extra_command {
            let handler = StructuralHandler::new(&ctx.module, alias);
            if !ctx.commands.register(alias, Arc::new(handler)) {
                return Err(format!("alias '{}' is taken", alias));
            }
        }
        Ok(())
    }

    fn on_disable(&self, ctx: &ModuleContext) -> Result<(), String> {
        self.log.push("disable", ctx.module.name());
        Ok(())
    }

    fn on_command(&self, label: &str, _args: &[&str]) -> Result<String, String> {
        Ok(format!("ran {}", label))
    }
}

/// Handler that does not declare its owner: only a look at its fields
/// tells which module it belongs to
pub struct StructuralHandler {
    label: String,
    module: ModuleId,
    loader: Arc<dyn CodeLoader>,
}

impl StructuralHandler {
    pub fn new(module: &Module, label: &str) -> Self {
        Self {
            label: label.to_string(),
            module: module.id(),
            loader: module.loader().clone(),
        }
    }
}

impl CommandHandler for StructuralHandler {
    fn label(&self) -> &str {
        &self.label
    }

    fn inspect(&self) -> Result<Vec<HandlerField>, InspectError> {
        if self.loader.is_closed() {
            return Err(InspectError::ResourceClosed(format!(
                "loader behind '{}' is closed",
                self.label
            )));
        }
        Ok(vec![
            HandlerField::text("label", &self.label),
            HandlerField::module("plugin", self.module),
        ])
    }

    fn execute(&self, _args: &[&str]) -> Result<String, String> {
        Ok(format!("{} executed", self.label))
    }
}

/// Module entry whose disable hook panics
#[derive(Debug, Default)]
pub struct PanickingDisable;

impl ModuleEntry for PanickingDisable {
    fn on_disable(&self, ctx: &ModuleContext) -> Result<(), String> {
        panic!("{} refuses to be disabled", ctx.module.name());
    }
}

/// Gentle-unload negotiator with a fixed answer
#[derive(Debug)]
pub struct FixedAnswer {
    answer: bool,
    calls: AtomicUsize,
}

impl FixedAnswer {
    pub fn consent() -> Arc<Self> {
        Arc::new(Self {
            answer: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn veto() -> Arc<Self> {
        Arc::new(Self {
            answer: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GentleUnload for FixedAnswer {
    async fn ask_for_gentle_unload(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}
