//! Shared configuration for smoothly tools.
//!
//! A TOML file of defaults and named boards, merged with `SMOOTHLY_*`
//! environment variables, and its translation into `smoothly_core`
//! runtime types. Nested keys use a double underscore in the
//! environment: `SMOOTHLY_SCAN__BOARD_TIMEOUT=3000` sets
//! `[scan] board_timeout`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use smoothly_core::config::{
    DEFAULT_BOARD_TIMEOUT, DEFAULT_COMMAND_TIMEOUT, DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_LIMIT,
    DEFAULT_SCAN_TIMEOUT, DEFAULT_WATCH_INTERVAL, DEFAULT_WATCH_TIMEOUT, MAX_SCAN_TIMEOUT_MS,
    MIN_SCAN_TIMEOUT_MS,
};
use smoothly_core::{BoardConfig, CommandDefaults, ScanConfig, WatchConfig};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "SMOOTHLY_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no board given and no default board configured")]
    NoBoard,

    #[error("unknown board '{name}'")]
    UnknownBoard { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration. Durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Board used when a command names none.
    pub default_board: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub command: CommandSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub scan: ScanSection,

    /// Named boards.
    #[serde(default)]
    pub boards: BTreeMap<String, BoardEntry>,
}

/// Output defaults for the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandSection {
    pub timeout: u64,
    /// `0` retries immediately.
    pub retry_interval: u64,
    /// `0` disables retries.
    pub retry_limit: u32,
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            timeout: ms(DEFAULT_COMMAND_TIMEOUT),
            retry_interval: ms(DEFAULT_RETRY_INTERVAL),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchSection {
    pub interval: u64,
    pub timeout: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            interval: ms(DEFAULT_WATCH_INTERVAL),
            timeout: ms(DEFAULT_WATCH_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    /// Probe timeout per address.
    pub timeout: u64,
    /// Command timeout given to discovered boards.
    pub board_timeout: u64,
    /// Targets scanned when none are given, e.g. `"192.168.1.*"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            timeout: ms(DEFAULT_SCAN_TIMEOUT),
            board_timeout: ms(DEFAULT_BOARD_TIMEOUT),
            input: None,
        }
    }
}

/// A named board. Unset fields fall back to the global sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BoardEntry {
    /// IP address or hostname, optionally with a port.
    pub address: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_interval: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_timeout: Option<u64>,
}

impl BoardEntry {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

fn ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    pub fn command_defaults(&self) -> CommandDefaults {
        command_defaults(
            self.command.timeout,
            self.command.retry_interval,
            self.command.retry_limit,
        )
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: Duration::from_millis(self.watch.interval),
            timeout: Duration::from_millis(self.watch.timeout),
        }
    }

    /// Scanner settings, with the probe timeout range checked.
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        let timeout = self.scan.timeout;
        if !(MIN_SCAN_TIMEOUT_MS..=MAX_SCAN_TIMEOUT_MS).contains(&timeout) {
            return Err(invalid(
                "scan.timeout",
                format!(
                    "must be between {MIN_SCAN_TIMEOUT_MS} and {MAX_SCAN_TIMEOUT_MS} ms, got {timeout}"
                ),
            ));
        }
        Ok(ScanConfig {
            timeout: Duration::from_millis(timeout),
            board_timeout: Duration::from_millis(self.scan.board_timeout),
        })
    }

    /// Resolve a board by configured name, falling back to treating
    /// `target` as a raw address. `None` picks `default_board`.
    pub fn resolve_board(&self, target: Option<&str>) -> Result<BoardConfig, ConfigError> {
        let target = match target {
            Some(target) => target.trim(),
            None => self
                .default_board
                .as_deref()
                .map(str::trim)
                .ok_or(ConfigError::NoBoard)?,
        };

        if let Some(entry) = self.boards.get(target) {
            return self.board_config(target, entry);
        }
        if target.is_empty() {
            return Err(ConfigError::NoBoard);
        }
        validate_address("board", target)?;
        Ok(BoardConfig::new(target)
            .with_command_defaults(self.command_defaults())
            .with_watch(self.watch_config()))
    }

    fn board_config(&self, name: &str, entry: &BoardEntry) -> Result<BoardConfig, ConfigError> {
        validate_address(&format!("boards.{name}.address"), &entry.address)?;

        let command = command_defaults(
            entry.timeout.unwrap_or(self.command.timeout),
            entry.retry_interval.unwrap_or(self.command.retry_interval),
            entry.retry_limit.unwrap_or(self.command.retry_limit),
        );
        let watch = WatchConfig {
            interval: Duration::from_millis(entry.watch_interval.unwrap_or(self.watch.interval)),
            timeout: Duration::from_millis(entry.watch_timeout.unwrap_or(self.watch.timeout)),
        };
        Ok(BoardConfig::new(&entry.address)
            .with_command_defaults(command)
            .with_watch(watch))
    }

    /// Add or replace a named board.
    pub fn add_board(&mut self, name: &str, address: &str) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(invalid("board name", format!("'{name}' is not a valid name")));
        }
        let address = address.trim();
        validate_address("board address", address)?;
        self.boards.insert(name.to_owned(), BoardEntry::new(address));
        Ok(())
    }

    /// Remove a named board; clears `default_board` if it pointed at it.
    pub fn remove_board(&mut self, name: &str) -> Result<BoardEntry, ConfigError> {
        let entry = self
            .boards
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownBoard { name: name.into() })?;
        if self.default_board.as_deref() == Some(name) {
            self.default_board = None;
        }
        Ok(entry)
    }
}

fn command_defaults(timeout: u64, retry_interval: u64, retry_limit: u32) -> CommandDefaults {
    CommandDefaults {
        timeout: Duration::from_millis(timeout),
        retry_interval: Duration::from_millis(retry_interval),
        retry_limit,
    }
}

fn validate_address(field: &str, address: &str) -> Result<(), ConfigError> {
    if address.is_empty() {
        return Err(invalid(field, "address is empty"));
    }
    if address.contains(char::is_whitespace) || address.contains('/') {
        return Err(invalid(field, format!("'{address}' is not a host address")));
    }
    Ok(())
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `SMOOTHLY_CONFIG` if set, else the
/// platform config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("rs", "smoothly", "smoothly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("smoothly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load defaults, then `path` (if it exists), then `SMOOTHLY_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SMOOTHLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
