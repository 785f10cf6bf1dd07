//! Command-line interface: one-shot maintenance subcommands
//! (`scan`, `cache-info`, `doctor`) plus the no-subcommand path that
//! launches the player itself.

mod commands;

pub use commands::{Cli, Commands, run_command};
