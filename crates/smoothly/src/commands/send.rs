//! `send`: submit one command to a board and print the reply.

use std::time::Duration;

use smoothly_core::{Board, CommandReply, ParsedResponse};

use crate::cli::SendArgs;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: SendArgs, settings: &Settings) -> Result<(), CliError> {
    let config = settings.board_config(Some(&args.board))?;
    let board = Board::http(config)?;

    let text = args.command.join(" ");
    if text.trim().is_empty() {
        return Err(CliError::Validation {
            field: "command".into(),
            reason: "command text is empty".into(),
        });
    }

    let mut command = board.new_command(text);
    let defaults = board.config().command;
    if args.no_retry {
        command = command.without_retry();
    } else if args.retry_interval.is_some() || args.retry_limit.is_some() {
        let interval = args.retry_interval.map_or(defaults.retry_interval, Duration::from_millis);
        command = command.with_retry(interval, args.retry_limit.unwrap_or(defaults.retry_limit));
    }
    if args.parse {
        command = command.parsed();
    }

    let reply = board.send(command).await?;
    tracing::debug!(attempts = reply.attempts, "command answered");

    let out = output::render_single(
        settings.output,
        &reply,
        |r| detail(r, settings.color),
        |r| r.raw.trim_end().to_owned(),
    );
    output::print_output(&out, settings.quiet);
    Ok(())
}

fn detail(reply: &CommandReply, color: bool) -> String {
    match &reply.parsed {
        Some(ParsedResponse::Version(info)) => super::version::info_fields(info, color),
        Some(ParsedResponse::Ok) => output::status_text("ok", true, color),
        None => reply.raw.trim_end().to_owned(),
    }
}
