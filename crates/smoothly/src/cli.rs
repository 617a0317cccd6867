//! Clap derive structures for the `smoothly` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.
//! Also compiled by `build.rs` for man page generation, so it must only
//! depend on clap and clap_complete.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// smoothly: find and command Smoothieboard controllers on the network
#[derive(Debug, Parser)]
#[command(
    name = "smoothly",
    version,
    about = "Find and command Smoothieboard controllers on the network",
    long_about = "Scan the local network for Smoothieboard controllers, send them\n\
        commands over HTTP, and watch their connection state.\n\n\
        BOARD arguments take a board name from the config file or a raw\n\
        address such as 192.168.1.102.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "SMOOTHLY_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, env = "SMOOTHLY_COLOR", global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Command timeout in milliseconds (overrides config)
    #[arg(long, env = "SMOOTHLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the network for boards
    #[command(alias = "s")]
    Scan(ScanArgs),

    /// Send a raw command to a board
    Send(SendArgs),

    /// Show a board's firmware and hardware
    #[command(alias = "info")]
    Version(VersionArgs),

    /// Connect to a board and report its connection state until Ctrl-C
    Watch(WatchArgs),

    /// Manage configuration and named boards
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Scan ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Targets: comma-separated IPs, hostnames, ranges (192.168.1.10-20)
    /// or subnets (192.168.1.*) [default: [scan] input from config]
    pub input: Option<String>,

    /// Per-address probe timeout in milliseconds (100-2000)
    #[arg(long, short = 't')]
    pub probe_timeout: Option<u64>,

    /// Command timeout in milliseconds recorded for found boards
    #[arg(long)]
    pub board_timeout: Option<u64>,
}

// ── Send ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Board name or address
    pub board: String,

    /// Command text, e.g. `version` or `ls -s /sd`
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Retries after the first attempt
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    pub retry_interval: Option<u64>,

    /// Send once, without retrying
    #[arg(long, conflicts_with_all = ["retry_limit", "retry_interval"])]
    pub no_retry: bool,

    /// Parse the response (commands with a known reply format only)
    #[arg(long, short = 'p')]
    pub parse: bool,
}

// ── Version / Watch ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct VersionArgs {
    /// Board name or address [default: default_board from config]
    pub board: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Board name or address [default: default_board from config]
    pub board: Option<String>,

    /// Delay between liveness probes in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Liveness probe timeout in milliseconds
    #[arg(long)]
    pub watch_timeout: Option<u64>,

    /// Stop after this many watch cycles
    #[arg(long)]
    pub cycles: Option<u32>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration
    Show,

    /// Add or replace a named board
    AddBoard {
        /// Board name
        name: String,

        /// IP address or hostname, optionally with a port
        address: String,

        /// Make this the default board
        #[arg(long)]
        default: bool,
    },

    /// Remove a named board
    #[command(alias = "rm-board")]
    RemoveBoard {
        /// Board name
        name: String,
    },

    /// Set the default board
    Use {
        /// Board name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
