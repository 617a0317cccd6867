//! Response parsers, keyed by command name.
//!
//! The firmware answers in free-form text. Only commands with a known
//! reply shape have a parser; everything else is returned raw by the
//! caller. [`parse_response`] dispatches on the first token of the
//! command text.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::wire::command_name;

/// Firmware and hardware identity reported by the `version` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Firmware branch, e.g. `"edge"`.
    pub branch: String,
    /// Firmware commit hash, e.g. `"9ab4538"`.
    pub hash: String,
    /// Firmware build date.
    pub date: String,
    /// Board MCU, e.g. `"LPC1769"`.
    pub mcu: String,
    /// System clock frequency, e.g. `"120MHz"`.
    pub clock: String,
}

/// A parsed command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ParsedResponse {
    /// Plain acknowledgement (`ok`).
    Ok,
    /// Answer to `version`.
    Version(BoardInfo),
}

/// Parse the raw response of `command` with the parser registered for
/// its name.
pub fn parse_response(command: &str, raw: &str) -> Result<ParsedResponse, Error> {
    match command_name(command) {
        "ok" => parse_ok(raw).map(|()| ParsedResponse::Ok),
        "version" => parse_version(raw).map(ParsedResponse::Version),
        name => Err(Error::ParserNotImplemented {
            command: name.to_owned(),
        }),
    }
}

/// `ok` succeeds only on a bare `ok` reply.
pub fn parse_ok(raw: &str) -> Result<(), Error> {
    if raw.trim() == "ok" {
        Ok(())
    } else {
        Err(Error::Parse {
            command: "ok".into(),
            message: "ko".into(),
        })
    }
}

/// Parse a version line:
/// `Build version: edge-9ab4538, Build date: Oct 10 2016 04:09:42, MCU: LPC1769, System Clock: 120MHz`
pub fn parse_version(raw: &str) -> Result<BoardInfo, Error> {
    let unknown = || Error::Parse {
        command: "version".into(),
        message: "Unknown version string".into(),
    };

    let text = raw.trim();
    let (_, rest) = text.split_once("Build version: ").ok_or_else(unknown)?;
    let (version, rest) = rest.split_once(", Build date: ").ok_or_else(unknown)?;
    let (date, rest) = rest.split_once(", MCU: ").ok_or_else(unknown)?;
    let (mcu, clock) = rest.split_once(", System Clock: ").ok_or_else(unknown)?;
    let (branch, hash) = version.split_once('-').ok_or_else(unknown)?;

    Ok(BoardInfo {
        branch: branch.trim().to_owned(),
        hash: hash.trim().to_owned(),
        date: date.trim().to_owned(),
        mcu: mcu.trim().to_owned(),
        clock: clock.lines().next().unwrap_or("").trim().to_owned(),
    })
}
