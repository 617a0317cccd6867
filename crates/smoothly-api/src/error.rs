use thiserror::Error;

/// Top-level error type for the `smoothly-api` crate.
///
/// Request failures are *not* represented here: a request that reached
/// the network and failed is a [`TransportFailure`](crate::TransportFailure),
/// which carries the classified failure kind the retry pipeline needs.
/// This type covers everything around the request instead: building
/// the HTTP client, constructing URLs, and parsing response text.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport setup ─────────────────────────────────────────────
    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Board address does not form a valid command URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Response parsing ────────────────────────────────────────────
    /// No parser exists for the given command name.
    #[error("No response parser for command '{command}'")]
    ParserNotImplemented { command: String },

    /// The response text did not match what the command's parser expects.
    #[error("Failed to parse '{command}' response: {message}")]
    Parse { command: String, message: String },
}

impl Error {
    /// Returns `true` if the error came from response parsing.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::ParserNotImplemented { .. } | Self::Parse { .. })
    }
}
