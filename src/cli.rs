use crate::config::Settings;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Runs a script against physical and virtual joysticks at a fixed rate
#[derive(Parser, Debug)]
#[command(name = "simscript")]
#[command(version)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Ticks per second (overrides the config file)
    #[arg(short = 'h', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub hertz: Option<u32>,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Config file to use instead of the per-user one
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Script to run, by name with or without the .rhai extension
    #[arg(value_name = "SCRIPT")]
    pub script: Option<String>,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Applies command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(hertz) = self.hertz {
            settings.hertz = hertz;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_h_is_hertz() {
        let cli = Cli::try_parse_from(["simscript", "-h", "60", "-d", "remap"]).unwrap();
        assert_eq!(cli.hertz, Some(60));
        assert!(cli.debug);
        assert_eq!(cli.script.as_deref(), Some("remap"));

        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.hertz, 60);
    }

    #[test]
    fn defaults_leave_settings_alone() {
        let cli = Cli::try_parse_from(["simscript"]).unwrap();
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, Settings::default());
        assert!(cli.script.is_none());
    }

    #[test]
    fn bad_invocations_are_errors() {
        assert!(Cli::try_parse_from(["simscript", "--hertz", "0"]).is_err());
        assert!(Cli::try_parse_from(["simscript", "--hertz", "fast"]).is_err());
        assert!(Cli::try_parse_from(["simscript", "one", "two"]).is_err());
        assert!(Cli::try_parse_from(["simscript", "--bogus"]).is_err());
    }

    #[test]
    fn long_help_is_still_available() {
        let err = Cli::try_parse_from(["simscript", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
