//! `scan`: probe a set of addresses and list the boards that answer.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use smoothly_core::{DiscoveredBoard, ScanEventKind, ScanStatus, Scanner};
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::ScanArgs;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Output rows ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct FoundBoard {
    address: String,
    branch: String,
    hash: String,
    date: String,
    mcu: String,
    clock: String,
    timeout_ms: u64,
}

impl From<DiscoveredBoard> for FoundBoard {
    fn from(board: DiscoveredBoard) -> Self {
        Self {
            address: board.address,
            branch: board.info.branch,
            hash: board.info.hash,
            date: board.info.date,
            mcu: board.info.mcu,
            clock: board.info.clock,
            timeout_ms: u64::try_from(board.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Tabled)]
struct BoardRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Build date")]
    date: String,
    #[tabled(rename = "MCU")]
    mcu: String,
    #[tabled(rename = "Clock")]
    clock: String,
}

impl From<&FoundBoard> for BoardRow {
    fn from(b: &FoundBoard) -> Self {
        Self {
            address: b.address.clone(),
            firmware: format!("{}-{}", b.branch, b.hash),
            date: b.date.clone(),
            mcu: b.mcu.clone(),
            clock: b.clock.clone(),
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: ScanArgs, settings: &Settings) -> Result<(), CliError> {
    let input = args
        .input
        .or_else(|| settings.config.scan.input.clone())
        .ok_or_else(|| CliError::ScanInput {
            token: String::new(),
            reason: "no scan targets given and no [scan] input in config".into(),
        })?;

    let scanner = Scanner::http(settings.config.scan_config()?)?;
    if let Some(ms) = args.board_timeout {
        scanner.set_board_timeout(Duration::from_millis(ms));
    }

    let mut rx = scanner.subscribe();
    scanner.start(Some(input.as_str()), args.probe_timeout)?;
    let progress = scanner.progress();
    tracing::info!(total = progress.total, "scan started");

    let bar = progress_bar(u64::try_from(progress.total).unwrap_or(u64::MAX), settings.quiet);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => match event.kind {
                    ScanEventKind::Progress => {
                        bar.set_position(u64::try_from(event.progress.scanned).unwrap_or(u64::MAX));
                    }
                    ScanEventKind::Board => {
                        if let Some(board) = &event.board {
                            bar.set_message(format!("{} found", event.progress.found));
                            bar.println(format!(
                                "{} {}",
                                output::status_text("found", true, settings.color),
                                board.address
                            ));
                        }
                    }
                    ScanEventKind::End | ScanEventKind::Stop => break,
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "scan events lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                if let Err(err) = scanner.stop() {
                    tracing::debug!(%err, "scan already finished");
                }
                break;
            }
        }
    }
    bar.finish_and_clear();

    let progress = scanner.progress();
    if progress.status == ScanStatus::Stopped && !settings.quiet {
        eprintln!(
            "{}",
            output::muted(
                &format!(
                    "scan stopped after {} of {} addresses",
                    progress.scanned, progress.total
                ),
                settings.color,
            )
        );
    }

    let found: Vec<FoundBoard> = scanner.discovered().into_iter().map(Into::into).collect();
    let out = output::render_list(
        settings.output,
        &found,
        |b| BoardRow::from(b),
        |b| b.address.clone(),
    );
    output::print_output(&out, settings.quiet);
    Ok(())
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}
