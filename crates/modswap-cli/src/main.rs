//! modswap CLI - operator console for module lifecycle management

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use context::CliContext;

pub use error::CliError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { path, force } => {
            commands::init::run(&path, force)?;
        }

        Commands::Inspect { archive } => {
            commands::inspect::run(&archive)?;
        }

        Commands::New {
            name,
            version,
            commands: declared,
            output,
        } => {
            let ctx = CliContext::load(&cli.config, cli.module_dir.as_deref())?;
            let dir = output.unwrap_or_else(|| ctx.config.module_dir.clone());
            commands::new::run(&dir, &ctx.config.extension, &name, &version, &declared)?;
        }

        Commands::Resolve { name } => {
            let ctx = CliContext::load(&cli.config, cli.module_dir.as_deref())?;
            commands::resolve::run(&ctx, &name)?;
        }

        Commands::Console { empty } => {
            let ctx = CliContext::load(&cli.config, cli.module_dir.as_deref())?;
            commands::console::run(ctx, !empty).await?;
        }
    }

    Ok(())
}
