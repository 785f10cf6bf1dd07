//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `scan`: one-shot library scan and cache inspection
//! - `doctor`: self-check diagnostics

mod doctor;
mod scan;

use clap::{Parser, Subcommand};

pub use doctor::cmd_doctor;
pub use scan::{cmd_cache_info, cmd_scan};

/// A terminal-resident music player.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands. Running with no subcommand launches the
/// player itself.
#[derive(Subcommand)]
pub enum Commands {
    /// Scan configured music directories once and persist the result.
    Scan,
    /// Print library and artwork cache statistics without scanning.
    CacheInfo,
    /// Run startup self-checks (config, cache files, music directories).
    Doctor,
}

/// Run the specified CLI command.
///
/// Returns `Ok(true)` if a command was run (the process should exit
/// after), `Ok(false)` if no command was specified (the player should
/// launch).
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let config = crate::config::load();

    match &cli.command {
        Some(Commands::Scan) => {
            scan::cmd_scan(&config)?;
            Ok(true)
        }
        Some(Commands::CacheInfo) => {
            scan::cmd_cache_info(&config)?;
            Ok(true)
        }
        Some(Commands::Doctor) => {
            let healthy = doctor::cmd_doctor()?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(true)
        }
        None => Ok(false),
    }
}
