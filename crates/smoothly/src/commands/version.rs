//! `version`: firmware and hardware identity of one board.

use serde::Serialize;
use smoothly_core::{Board, BoardInfo};

use crate::cli::VersionArgs;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct VersionReport {
    address: String,
    #[serde(flatten)]
    info: BoardInfo,
}

pub async fn handle(args: VersionArgs, settings: &Settings) -> Result<(), CliError> {
    let config = settings.board_config(args.board.as_deref())?;
    let board = Board::http(config)?;
    let info = board.version().await?;

    let report = VersionReport {
        address: board.address().to_owned(),
        info,
    };
    let out = output::render_single(
        settings.output,
        &report,
        |r| {
            let title = output::heading(&r.address, settings.color);
            format!("{title}\n{}", info_fields(&r.info, settings.color))
        },
        |r| format!("{}-{}", r.info.branch, r.info.hash),
    );
    output::print_output(&out, settings.quiet);
    Ok(())
}

/// Detail lines for a board's identity.
pub(crate) fn info_fields(info: &BoardInfo, color: bool) -> String {
    output::render_fields(
        &[
            ("Firmware", format!("{}-{}", info.branch, info.hash)),
            ("Build date", info.date.clone()),
            ("MCU", info.mcu.clone()),
            ("Clock", info.clock.clone()),
        ],
        color,
    )
}
