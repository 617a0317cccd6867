// ── Command API ──
//
// A `Command` is one logical request to one board. The pipeline mutates
// only its attempt counter while retrying; everything else is fixed when
// the command is built.

use std::time::Duration;

use serde::Serialize;
use smoothly_api::{ParsedResponse, ProgressSender, TransportFailure, WireResponse};

use crate::config::CommandDefaults;
use crate::error::CoreError;
use crate::event::millis;

/// Command used to test whether a board is alive.
pub const PROBE_COMMAND: &str = "version";

/// A single logical command and its retry policy.
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    pub timeout: Duration,
    /// Delay before resubmitting after a failure.
    pub retry_interval: Duration,
    /// Retries allowed after the first attempt. `0` means single-shot.
    pub retry_limit: u32,
    /// Parse the response with the parser registered for the command name.
    pub parse_response: bool,
    attempt: u32,
    progress: Option<ProgressSender>,
}

impl Command {
    /// Build a command with the stock defaults (5 s timeout, 5 retries
    /// every 5 s).
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_defaults(text, &CommandDefaults::default())
    }

    pub fn with_defaults(text: impl Into<String>, defaults: &CommandDefaults) -> Self {
        Self {
            text: text.into().trim().to_owned(),
            timeout: defaults.timeout,
            retry_interval: defaults.retry_interval,
            retry_limit: defaults.retry_limit,
            parse_response: false,
            attempt: 0,
            progress: None,
        }
    }

    /// A single-shot liveness probe.
    pub fn probe(text: impl Into<String>, timeout: Duration) -> Self {
        Self::new(text).with_timeout(timeout).without_retry()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, interval: Duration, limit: u32) -> Self {
        self.retry_interval = interval;
        self.retry_limit = limit;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_limit = 0;
        self
    }

    /// Ask for a parsed response.
    pub fn parsed(mut self) -> Self {
        self.parse_response = true;
        self
    }

    /// Forward download progress of every attempt to `progress`.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Retries performed so far (0 on the first attempt).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts made so far, counting the one in flight.
    pub fn attempts(&self) -> u32 {
        self.attempt + 1
    }

    pub(crate) fn progress(&self) -> Option<&ProgressSender> {
        self.progress.as_ref()
    }

    /// Delay before the next retry, or `None` once the limit is reached.
    pub(crate) fn retry_delay(&self) -> Option<Duration> {
        (self.attempt < self.retry_limit).then_some(self.retry_interval)
    }

    pub(crate) fn advance(&mut self) {
        self.attempt += 1;
    }

    pub(crate) fn request_info(&self) -> RequestInfo {
        RequestInfo {
            command: self.text.clone(),
            attempt: self.attempts(),
            timeout_ms: millis(self.timeout),
        }
    }
}

/// Snapshot of a command as it goes on the wire, carried by events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestInfo {
    pub command: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub timeout_ms: u64,
}

/// Classified result of a pipeline run. Exactly one per submission.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Success(WireResponse),
    /// The board answered but refused the command. Never retried.
    UnsupportedCommand {
        response: WireResponse,
        detail: String,
    },
    /// Every allowed attempt failed.
    TransportFailure {
        failure: TransportFailure,
        attempts: u32,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// `true` if the board answered at all, whatever it said.
    pub fn board_answered(&self) -> bool {
        !matches!(self, Self::TransportFailure { .. })
    }

    /// Turn the outcome into the response or the matching [`CoreError`].
    pub fn into_response(self, address: &str, command: &str) -> Result<WireResponse, CoreError> {
        match self {
            Self::Success(response) => Ok(response),
            Self::UnsupportedCommand { detail, .. } => Err(CoreError::UnsupportedCommand {
                address: address.to_owned(),
                command: command.to_owned(),
                detail,
            }),
            Self::TransportFailure { failure, attempts } => Err(CoreError::TransportFailure {
                address: address.to_owned(),
                command: command.to_owned(),
                kind: failure.kind,
                attempts,
            }),
        }
    }
}

/// What [`Board::send`](crate::Board::send) resolves with.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub command: String,
    pub raw: String,
    pub parsed: Option<ParsedResponse>,
    pub attempts: u32,
}
