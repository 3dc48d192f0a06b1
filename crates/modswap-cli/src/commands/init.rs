//! `modswap init` command implementation

use crate::CliError;
use colored::Colorize;
use modswap_kernel::config::ModswapConfig;
use std::path::Path;

/// Name of the configuration file `init` writes
pub const CONFIG_FILE: &str = "modswap.toml";

/// Execute the `modswap init` command
pub fn run(path: &Path, force: bool) -> Result<(), CliError> {
    println!("{} Initializing modswap in: {}", "→".green(), path.display());

    std::fs::create_dir_all(path)?;
    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() && !force {
        println!("  {} already exists", CONFIG_FILE);
        return Ok(());
    }

    std::fs::write(&config_path, render_default_config()?)?;
    println!("  Created: {}", CONFIG_FILE);

    let config = ModswapConfig::default();
    let module_dir = path.join(&config.module_dir);
    if !module_dir.exists() {
        std::fs::create_dir_all(&module_dir)?;
        println!("  Created: {}/", config.module_dir.display());
    }

    println!("{} modswap initialized!", "✓".green());
    Ok(())
}

fn render_default_config() -> Result<String, CliError> {
    let body = toml::to_string_pretty(&ModswapConfig::default())?;
    Ok(format!(
        "# modswap configuration\n# Values can reference environment variables as ${{VAR}}\n\n{}",
        body
    ))
}
