//! `modswap resolve` command implementation

use crate::CliError;
use crate::context::CliContext;
use colored::Colorize;

/// Execute the `modswap resolve` command
pub fn run(ctx: &CliContext, name: &str) -> Result<(), CliError> {
    let locator = ctx.manager.locator();
    println!(
        "{} Resolving {} in {}",
        "→".green(),
        name.cyan(),
        locator.dir().display()
    );

    match locator.resolve(ctx.manager.host().as_ref(), name) {
        Ok(path) => {
            println!("  {} {}", "✓".green(), path.display());
            Ok(())
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            Err(CliError::Lifecycle(e.into()))
        }
    }
}
