//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// modswap - load, unload and reload modules without restarting the host
#[derive(Parser)]
#[command(name = "modswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "MODSWAP_CONFIG",
        default_value = "modswap.toml"
    )]
    pub config: PathBuf,

    /// Override the module directory from the configuration
    #[arg(short = 'd', long, global = true)]
    pub module_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a host, load every module in the module directory and accept
    /// lifecycle commands on stdin
    Console {
        /// Do not load the module directory at startup
        #[arg(long)]
        empty: bool,
    },

    /// Print the descriptor of a module archive
    Inspect {
        /// Archive path
        archive: PathBuf,
    },

    /// Show which archive a module name resolves to
    Resolve {
        /// Module name
        name: String,
    },

    /// Create a new module archive skeleton
    New {
        /// Module name
        name: String,

        /// Module version
        #[arg(long, default_value = "1.0.0")]
        version: String,

        /// Command to declare, can be repeated
        #[arg(long = "command")]
        commands: Vec<String>,

        /// Output directory, defaults to the module directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Directory to write modswap.toml into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
