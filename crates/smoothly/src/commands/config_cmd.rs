//! Config subcommand handlers.

use serde::Serialize;
use smoothly_config::BoardEntry;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, OutputFormat};
use crate::config::{self, Config, Settings};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct BoardListing {
    name: String,
    address: String,
    default: bool,
}

#[derive(Tabled)]
struct BoardRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
}

pub fn handle(args: ConfigArgs, settings: &Settings) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), settings.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let out = show(&settings.config, settings.output, settings.color);
            output::print_output(&out, settings.quiet);
            Ok(())
        }

        ConfigCommand::AddBoard {
            name,
            address,
            default,
        } => {
            let mut cfg = settings.config.clone();
            cfg.add_board(&name, &address)?;
            if default || cfg.default_board.is_none() {
                cfg.default_board = Some(name.trim().to_owned());
            }
            let path = config::save_config(&cfg)?;
            tracing::info!(path = %path.display(), board = %name, "board saved");
            if !settings.quiet {
                eprintln!("Board '{}' saved to {}", name.trim(), path.display());
            }
            Ok(())
        }

        ConfigCommand::RemoveBoard { name } => {
            let mut cfg = settings.config.clone();
            let removed: BoardEntry = cfg.remove_board(&name)?;
            config::save_config(&cfg)?;
            if !settings.quiet {
                eprintln!("Board '{name}' ({}) removed", removed.address);
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = settings.config.clone();
            if !cfg.boards.contains_key(&name) {
                return Err(CliError::UnknownBoard { name });
            }
            cfg.default_board = Some(name.clone());
            config::save_config(&cfg)?;
            if !settings.quiet {
                eprintln!("Default board set to '{name}'");
            }
            Ok(())
        }
    }
}

fn show(cfg: &Config, format: OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            output::render_single(format, cfg, |_| String::new(), |_| String::new())
        }
        OutputFormat::Plain => toml::to_string_pretty(cfg)
            .unwrap_or_else(|e| format!("# serialization failed: {e}")),
        OutputFormat::Table => {
            let boards: Vec<BoardListing> = cfg
                .boards
                .iter()
                .map(|(name, entry)| BoardListing {
                    name: name.clone(),
                    address: entry.address.clone(),
                    default: cfg.default_board.as_deref() == Some(name.as_str()),
                })
                .collect();

            let settings = output::render_fields(
                &[
                    ("Command timeout", format!("{} ms", cfg.command.timeout)),
                    ("Retry interval", format!("{} ms", cfg.command.retry_interval)),
                    ("Retry limit", cfg.command.retry_limit.to_string()),
                    ("Watch interval", format!("{} ms", cfg.watch.interval)),
                    ("Watch timeout", format!("{} ms", cfg.watch.timeout)),
                    ("Scan timeout", format!("{} ms", cfg.scan.timeout)),
                    (
                        "Scan input",
                        cfg.scan.input.clone().unwrap_or_else(|| "-".into()),
                    ),
                ],
                color,
            );
            if boards.is_empty() {
                return format!("{settings}\n\n{}", output::muted("No boards configured", color));
            }
            let table = output::render_list(
                OutputFormat::Table,
                &boards,
                |b| BoardRow {
                    marker: if b.default { "*".into() } else { String::new() },
                    name: b.name.clone(),
                    address: b.address.clone(),
                },
                |b| b.name.clone(),
            );
            format!("{settings}\n\n{table}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn table_marks_default_board() {
        let mut cfg = Config::default();
        cfg.add_board("bench", "10.0.0.2").unwrap();
        cfg.add_board("spare", "10.0.0.3").unwrap();
        cfg.default_board = Some("bench".into());

        let text = show(&cfg, OutputFormat::Table, false);
        let bench = text.lines().find(|l| l.contains("bench")).unwrap();
        assert!(bench.contains('*'));
        let spare = text.lines().find(|l| l.contains("spare")).unwrap();
        assert!(!spare.contains('*'));
    }

    #[test]
    fn plain_is_toml() {
        let mut cfg = Config::default();
        cfg.add_board("bench", "10.0.0.2").unwrap();

        let text = show(&cfg, OutputFormat::Plain, false);
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }
}
