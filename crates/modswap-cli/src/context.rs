//! CLI context providing access to the host and the lifecycle manager

use crate::CliError;
use modswap_kernel::config::ModswapConfig;
use modswap_plugins::{InMemoryHost, LifecycleManager};
use std::path::Path;
use std::sync::Arc;

/// Shared context for CLI commands
pub struct CliContext {
    /// Effective configuration
    pub config: ModswapConfig,
    /// Reference host the console drives
    pub host: Arc<InMemoryHost>,
    /// Lifecycle manager bound to `host`
    pub manager: Arc<LifecycleManager>,
}

impl CliContext {
    /// Read the configuration file and build a host around it
    pub fn load(config_path: &Path, module_dir: Option<&Path>) -> Result<Self, CliError> {
        let mut config = ModswapConfig::load(config_path)
            .map_err(|report| CliError::ConfigError(format!("{:?}", report)))?;
        if let Some(dir) = module_dir {
            config.module_dir = dir.to_path_buf();
        }
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: ModswapConfig) -> Self {
        let host = Arc::new(InMemoryHost::new());
        let manager = Arc::new(LifecycleManager::new(host.clone(), config.clone()));
        Self {
            config,
            host,
            manager,
        }
    }
}
