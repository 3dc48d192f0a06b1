//! `modswap inspect` command implementation

use crate::CliError;
use colored::Colorize;
use modswap_plugins::host::read_descriptor;
use std::path::Path;

/// Execute the `modswap inspect` command
pub fn run(archive: &Path) -> Result<(), CliError> {
    println!("{} Module archive: {}", "→".green(), archive.display());
    println!();

    let descriptor = read_descriptor(archive)?;
    println!("  Name:           {}", descriptor.name.cyan());
    println!("  Version:        {}", descriptor.version.white());
    if let Some(main) = &descriptor.main {
        println!("  Entry point:    {}", main.white());
    } else {
        println!("  Entry point:    {}", "(declarative)".dimmed());
    }
    if let Some(api) = descriptor.api_version {
        println!("  API version:    {}", api);
    }
    if let Some(description) = &descriptor.description {
        println!("  Description:    {}", description.white());
    }
    if !descriptor.authors.is_empty() {
        println!("  Authors:        {}", descriptor.authors.join(", ").white());
    }

    if !descriptor.commands.is_empty() {
        println!("  Commands:");
        for (name, spec) in &descriptor.commands {
            let aliases = if spec.aliases.is_empty() {
                String::new()
            } else {
                format!(" (aliases: {})", spec.aliases.join(", "))
            };
            println!(
                "    {}{} {}",
                name.cyan(),
                aliases,
                spec.description.as_deref().unwrap_or("").dimmed()
            );
        }
    }

    println!();
    Ok(())
}
