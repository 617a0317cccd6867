//! Command dispatch: bridges CLI args -> core boards and scanners -> output formatting.

pub mod config_cmd;
pub mod scan;
pub mod send;
pub mod version;
pub mod watch;

use crate::cli::Command;
use crate::config::Settings;
use crate::error::CliError;

/// Dispatch a command to the appropriate handler.
pub async fn dispatch(cmd: Command, settings: &Settings) -> Result<(), CliError> {
    match cmd {
        Command::Scan(args) => scan::handle(args, settings).await,
        Command::Send(args) => send::handle(args, settings).await,
        Command::Version(args) => version::handle(args, settings).await,
        Command::Watch(args) => watch::handle(args, settings).await,
        Command::Config(args) => config_cmd::handle(args, settings),
        // Completions are handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}
