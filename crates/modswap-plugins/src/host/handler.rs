//! Handlers for descriptor-declared commands

use modswap_kernel::{
    CodeLoader, CommandHandler, CommandSpec, HandlerField, InspectError, Module, ModuleId,
};
use std::sync::Arc;

/// A command declared in a module descriptor and registered by the host
/// when the module is enabled. Execution is forwarded to the module's
/// entry point through its code loader.
pub struct ModuleCommand {
    label: String,
    owner: ModuleId,
    owner_name: String,
    spec: CommandSpec,
    loader: Arc<dyn CodeLoader>,
}

impl ModuleCommand {
    pub fn new(module: &Module, label: &str, spec: CommandSpec) -> Self {
        Self {
            label: label.to_string(),
            owner: module.id(),
            owner_name: module.name().to_string(),
            spec,
            loader: module.loader().clone(),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }
}

impl CommandHandler for ModuleCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn owner(&self) -> Option<ModuleId> {
        Some(self.owner)
    }

    fn inspect(&self) -> Result<Vec<HandlerField>, InspectError> {
        if self.loader.is_closed() {
            return Err(InspectError::ResourceClosed(format!(
                "loader of {} is closed",
                self.owner_name
            )));
        }
        Ok(vec![
            HandlerField::text("label", &self.label),
            HandlerField::module("owning_module", self.owner),
        ])
    }

    fn execute(&self, args: &[&str]) -> Result<String, String> {
        let entry = self
            .loader
            .entry()
            .ok_or_else(|| format!("{} is no longer loaded", self.owner_name))?;
        match entry.on_command(&self.label, args) {
            Ok(output) => Ok(output),
            Err(reason) => match &self.spec.usage {
                Some(usage) => Err(format!("{}\nUsage: {}", reason, usage)),
                None => Err(reason),
            },
        }
    }
}
