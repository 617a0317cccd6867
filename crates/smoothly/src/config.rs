//! CLI configuration: thin wrapper around `smoothly_config`.
//!
//! Merges the loaded config file with `GlobalOpts` overrides into the
//! settings every command handler works from.

use std::time::Duration;

use clap::ValueEnum;
use smoothly_core::BoardConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub use smoothly_config::{Config, config_path, load_config, save_config};

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
    /// `--timeout`, applied to every board command.
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Flags win over the config file's `[defaults]`.
    pub fn resolve(global: &GlobalOpts, config: Config) -> Result<Self, CliError> {
        let output = match global.output {
            Some(format) => format,
            None => parse_enum::<OutputFormat>("defaults.output", &config.defaults.output)?,
        };
        let color_mode = match global.color {
            Some(mode) => mode,
            None => parse_enum::<ColorMode>("defaults.color", &config.defaults.color)?,
        };
        if global.timeout == Some(0) {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be greater than 0 ms".into(),
            });
        }

        Ok(Self {
            config,
            output,
            color: output::should_color(color_mode),
            quiet: global.quiet,
            timeout: global.timeout.map(Duration::from_millis),
        })
    }

    /// Board configuration for a name or address, `None` meaning the
    /// default board.
    pub fn board_config(&self, target: Option<&str>) -> Result<BoardConfig, CliError> {
        let mut board = self.config.resolve_board(target)?;
        if let Some(timeout) = self.timeout {
            board.command.timeout = timeout;
        }
        Ok(board)
    }
}

fn parse_enum<E: ValueEnum>(field: &str, value: &str) -> Result<E, CliError> {
    E::from_str(value, true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["smoothly"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["config", "path"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn config_defaults_apply_without_flags() {
        let mut config = Config::default();
        config.defaults.output = "yaml".into();
        config.defaults.color = "never".into();

        let settings = Settings::resolve(&global(&[]), config).unwrap();
        assert_eq!(settings.output, OutputFormat::Yaml);
        assert!(!settings.color);
        assert!(settings.timeout.is_none());
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.defaults.output = "yaml".into();

        let settings =
            Settings::resolve(&global(&["-o", "json", "--timeout", "750"]), config).unwrap();
        assert_eq!(settings.output, OutputFormat::Json);

        let board = settings.board_config(Some("10.0.0.2")).unwrap();
        assert_eq!(board.address, "10.0.0.2");
        assert_eq!(board.command.timeout, Duration::from_millis(750));
    }

    #[test]
    fn unknown_output_in_config_is_rejected() {
        let mut config = Config::default();
        config.defaults.output = "xml".into();

        let err = Settings::resolve(&global(&["--color", "never"]), config).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "defaults.output"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Settings::resolve(&global(&["--timeout", "0"]), Config::default()).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }
}
