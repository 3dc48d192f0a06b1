//! `modswap new` command implementation

use crate::CliError;
use colored::Colorize;
use modswap_kernel::{CommandSpec, ModuleDescriptor};
use modswap_plugins::host::write_archive;
use std::path::{Path, PathBuf};

/// Execute the `modswap new` command
pub fn run(
    dir: &Path,
    extension: &str,
    name: &str,
    version: &str,
    commands: &[String],
) -> Result<PathBuf, CliError> {
    println!("{} Creating module: {}", "→".green(), name.cyan());

    let descriptor = skeleton(name, version, commands);
    descriptor.validate().map_err(CliError::Other)?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", name, extension));
    if path.exists() {
        return Err(CliError::Other(format!("{} already exists", path.display())));
    }

    let readme = format!("# {}\n\nDeclarative module created by modswap.\n", name);
    write_archive(&path, &descriptor, &[("README.md", readme.as_bytes())])?;

    println!("  Created: {}", path.display());
    println!("{} Module {} created!", "✓".green(), descriptor.full_name());
    Ok(path)
}

fn skeleton(name: &str, version: &str, commands: &[String]) -> ModuleDescriptor {
    let mut descriptor = ModuleDescriptor::new(name, version)
        .with_description(&format!("{} module", name))
        .with_api_version(modswap_plugins::host::CURRENT_API_VERSION);
    for command in commands {
        let spec = CommandSpec {
            description: Some(format!("{} command of {}", command, name)),
            usage: Some(format!("/{}", command)),
            aliases: Vec::new(),
        };
        descriptor = descriptor.with_command(command, spec);
    }
    descriptor
}
