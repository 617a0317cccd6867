//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use smoothly_config::ConfigError;
use smoothly_core::{ApiError, CoreError, FailureKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const UNSUPPORTED: i32 = 9;
    pub const CONFIG: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach board at {address} ({kind}, {attempts} attempt(s))")]
    #[diagnostic(
        code(smoothly::unreachable),
        help(
            "Check that the board is powered and on the network.\n\
             Find boards with: smoothly scan 192.168.1.*"
        )
    )]
    Unreachable {
        address: String,
        kind: FailureKind,
        attempts: u32,
    },

    #[error("Board at {address} did not answer in time ({attempts} attempt(s))")]
    #[diagnostic(
        code(smoothly::timeout),
        help("Increase the timeout with --timeout or check the board's load.")
    )]
    Timeout { address: String, attempts: u32 },

    // ── Board answers ────────────────────────────────────────────────
    #[error("Board at {address} does not support '{command}'")]
    #[diagnostic(code(smoothly::unsupported), help("The board said: {detail}"))]
    Unsupported {
        address: String,
        command: String,
        detail: String,
    },

    #[error("Unexpected answer: {message}")]
    #[diagnostic(
        code(smoothly::bad_response),
        help("The device answered but not like a Smoothieboard, or the command has no parser.")
    )]
    BadResponse { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid scan target '{token}': {reason}")]
    #[diagnostic(
        code(smoothly::scan_input),
        help("Examples: 192.168.1.*, 192.168.1.10-20, 10.0.0.5, smoothie.local")
    )]
    ScanInput { token: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(smoothly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No board given")]
    #[diagnostic(
        code(smoothly::no_board),
        help(
            "Pass a board name or address, or set a default with:\n\
             smoothly config add-board <NAME> <ADDRESS> --default"
        )
    )]
    NoBoard,

    #[error("Board '{name}' not found in configuration")]
    #[diagnostic(code(smoothly::unknown_board), help("List boards with: smoothly config show"))]
    UnknownBoard { name: String },

    #[error("Configuration error: {source}")]
    #[diagnostic(code(smoothly::config), help("Config file: {path}"))]
    Config {
        source: Box<ConfigError>,
        path: String,
    },

    // ── IO ───────────────────────────────────────────────────────────
    #[error("HTTP client error: {message}")]
    #[diagnostic(code(smoothly::http))]
    Http { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::ScanInput { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::NoBoard | Self::UnknownBoard { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::BadResponse { .. } | Self::Http { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput { token, reason } => Self::ScanInput { token, reason },

            CoreError::OutOfRange { field, .. } => Self::Validation {
                field: field.into(),
                reason: err.to_string(),
            },

            CoreError::AlreadyConnected { .. }
            | CoreError::NotConnected { .. }
            | CoreError::AlreadyScanning
            | CoreError::InvalidState { .. } => Self::Validation {
                field: "state".into(),
                reason: err.to_string(),
            },

            CoreError::UnsupportedCommand {
                address,
                command,
                detail,
            } => Self::Unsupported {
                address,
                command,
                detail,
            },

            CoreError::TransportFailure {
                address,
                kind,
                attempts,
                ..
            } => {
                if kind.is_timeout() {
                    Self::Timeout { address, attempts }
                } else {
                    Self::Unreachable {
                        address,
                        kind,
                        attempts,
                    }
                }
            }

            CoreError::Api(api) => match api {
                ApiError::InvalidUrl(e) => Self::Validation {
                    field: "address".into(),
                    reason: e.to_string(),
                },
                ApiError::Transport(e) => Self::Http {
                    message: e.to_string(),
                },
                other => Self::BadResponse {
                    message: other.to_string(),
                },
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoBoard => Self::NoBoard,
            ConfigError::UnknownBoard { name } => Self::UnknownBoard { name },
            other => {
                let path = smoothly_config::config_path().display().to_string();
                Self::Config {
                    source: Box::new(other),
                    path,
                }
            }
        }
    }
}
