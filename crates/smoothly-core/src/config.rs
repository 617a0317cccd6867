// ── Runtime configuration ──
//
// These types describe *how* to talk to a board and how to scan for
// them. They never touch disk: `smoothly-config` (or any other caller)
// builds them and hands them in.

use std::time::Duration;

/// Default response timeout for a command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default delay between two attempts of the same command.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5000);
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

/// Default delay between two watch probes.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(5000);
/// Default timeout of a watch probe.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default per-address scan probe timeout.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(2000);
/// Smallest accepted scan probe timeout, in milliseconds.
pub const MIN_SCAN_TIMEOUT_MS: u64 = 100;
/// Largest accepted scan probe timeout, in milliseconds.
pub const MAX_SCAN_TIMEOUT_MS: u64 = 2000;
/// Command timeout assigned to boards found by a scan.
pub const DEFAULT_BOARD_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-command defaults applied by [`Board::command`](crate::Board::command)
/// and [`Board::send_text`](crate::Board::send_text).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefaults {
    pub timeout: Duration,
    pub retry_interval: Duration,
    /// `0` disables retries.
    pub retry_limit: u32,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

/// Liveness watch tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WATCH_INTERVAL,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }
}

/// Configuration for a single board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// IP address or hostname, optionally with a port.
    pub address: String,
    pub command: CommandDefaults,
    pub watch: WatchConfig,
}

impl BoardConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().trim().to_owned(),
            command: CommandDefaults::default(),
            watch: WatchConfig::default(),
        }
    }

    pub fn with_command_defaults(mut self, command: CommandDefaults) -> Self {
        self.command = command;
        self
    }

    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }
}

/// Scanner tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Probe timeout per address; must stay within
    /// [`MIN_SCAN_TIMEOUT_MS`]..=[`MAX_SCAN_TIMEOUT_MS`].
    pub timeout: Duration,
    /// Command timeout handed to discovered boards.
    pub board_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            board_timeout: DEFAULT_BOARD_TIMEOUT,
        }
    }
}
