// ── Core error types ──
//
// Errors surfaced to callers of `Board` and `Scanner`. Validation errors
// are returned synchronously by the call that violates a precondition;
// command errors are the terminal result of a pipeline run. Scan probe
// failures never appear here; the scan loop swallows them.

use smoothly_api::FailureKind;
use thiserror::Error;

use crate::scanner::ScanStatus;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Validation errors ────────────────────────────────────────────
    #[error("Invalid scan input '{token}': {reason}")]
    InvalidInput { token: String, reason: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Board {address} is already connected")]
    AlreadyConnected { address: String },

    #[error("Board {address} is not connected")]
    NotConnected { address: String },

    #[error("A scan is already in progress")]
    AlreadyScanning,

    #[error("Cannot {operation} while scan is {status}")]
    InvalidState {
        operation: &'static str,
        status: ScanStatus,
    },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Board {address} rejected '{command}': {detail}")]
    UnsupportedCommand {
        address: String,
        command: String,
        detail: String,
    },

    #[error("{kind}: '{command}' to {address} failed after {attempts} attempt(s)")]
    TransportFailure {
        address: String,
        command: String,
        kind: FailureKind,
        attempts: u32,
    },

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] smoothly_api::Error),
}

impl CoreError {
    /// Returns `true` for precondition violations (bad input, wrong state).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::OutOfRange { .. }
                | Self::AlreadyConnected { .. }
                | Self::NotConnected { .. }
                | Self::AlreadyScanning
                | Self::InvalidState { .. }
        )
    }

    /// Returns `true` if the board may answer a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }

    /// Returns `true` if the board answered but the text could not be parsed.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_parse())
    }

    pub(crate) fn invalid_input(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            token: token.into(),
            reason: reason.into(),
        }
    }
}
