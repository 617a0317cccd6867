//! `watch`: connect to a board and stream its connection events.

use std::time::Duration;

use serde::Serialize;
use smoothly_core::{Board, BoardEvent, BoardEventKind, ConnectionStatus, CoreError, EventData};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{OutputFormat, WatchArgs};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

/// One streamed record: the event plus, after a watch cycle, the
/// board's connection state.
#[derive(Debug, Serialize)]
struct WatchLine<'a> {
    #[serde(flatten)]
    event: &'a BoardEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ConnectionStatus>,
}

pub async fn handle(args: WatchArgs, settings: &Settings) -> Result<(), CliError> {
    let mut config = settings.board_config(args.board.as_deref())?;
    if let Some(ms) = args.interval {
        config.watch.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.watch_timeout {
        config.watch.timeout = Duration::from_millis(ms);
    }
    if args.cycles == Some(0) {
        return Err(CliError::Validation {
            field: "cycles".into(),
            reason: "must be at least 1".into(),
        });
    }

    let board = Board::http(config)?;
    // Subscribe first so the connect event is not missed.
    let mut rx = board.subscribe();
    board.connect().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cycles = 0u32;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let status = (event.kind == BoardEventKind::Watch).then(|| board.status());
                    let line = WatchLine { event: &event, status };
                    output::print_output(&render_line(settings, &line), settings.quiet);

                    if event.kind == BoardEventKind::Watch {
                        cycles += 1;
                        if args.cycles.is_some_and(|limit| cycles >= limit) {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "board events lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    match board.disconnect() {
        Ok(()) | Err(CoreError::NotConnected { .. }) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn render_line(settings: &Settings, line: &WatchLine<'_>) -> String {
    match settings.output {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_line(line),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(line).trim_end()),
        OutputFormat::Table | OutputFormat::Plain => text_line(line, settings.color),
    }
}

fn text_line(line: &WatchLine<'_>, color: bool) -> String {
    let event = line.event;
    let time = event.time.format("%H:%M:%S").to_string();
    let kind = event.kind.to_string();
    let kind = match event.kind {
        BoardEventKind::Connect | BoardEventKind::Reconnect => {
            output::status_text(&kind, true, color)
        }
        BoardEventKind::Disconnect | BoardEventKind::Redisconnect | BoardEventKind::Error => {
            output::status_text(&kind, false, color)
        }
        _ => kind,
    };

    let detail = match (&event.data, &line.status) {
        (EventData::Info(info), _) => format!("{}-{} {}", info.branch, info.hash, info.mcu),
        (EventData::Error(message), _) => message.clone(),
        (EventData::Attempts(n), _) => format!("attempt {n}"),
        (EventData::Request(request), _) => {
            format!("{} (attempt {})", request.command, request.attempt)
        }
        (EventData::Response(body), _) => body.trim_end().to_owned(),
        (EventData::Parsed { request, .. }, _) => request.command.clone(),
        (EventData::None, Some(status)) => {
            let state = if status.online { "online" } else { "offline" };
            output::status_text(state, status.online, color)
        }
        (EventData::None, None) => String::new(),
    };

    format!("{} {:<16} {}", output::muted(&time, color), kind, detail)
        .trim_end()
        .to_owned()
}
