//! The `-v`/`-q` flags.
//!
//! Without flags, `ip-rotator` logs at `info`, which prints one line per
//! gateway created or deleted. Each `-v` raises the level by one step
//! (`debug`, then `trace`), each `-q` lowers it (`warn`, `error`, off).

use std::fmt;

use log::LevelFilter;
use serde::{Deserialize, Deserializer, de};

/// Levels from quietest to loudest; `info` sits at index 3
const LEVELS: [LevelFilter; 6] = [
    LevelFilter::Off,
    LevelFilter::Error,
    LevelFilter::Warn,
    LevelFilter::Info,
    LevelFilter::Debug,
    LevelFilter::Trace,
];
const DEFAULT_INDEX: i16 = 3;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More log output per occurrence (-v debug, -vv trace)
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Less log output per occurrence (-q warn, -qq error, -qqq off)
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    /// Log level filter selected by the flags
    // Clamped into range, so the casts cannot truncate
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        let index = DEFAULT_INDEX + i16::from(self.verbose) - i16::from(self.quiet);
        let max = LEVELS.len() as i16 - 1;
        LEVELS[index.clamp(0, max) as usize]
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn from_filter(filter: LevelFilter) -> Self {
        let index = LEVELS
            .iter()
            .position(|level| *level == filter)
            .map_or(DEFAULT_INDEX, |i| i as i16);
        let offset = index - DEFAULT_INDEX;
        Self {
            verbose: offset.max(0) as u8,
            quiet: (-offset).max(0) as u8,
        }
    }
}

/// Read from a level name in the config file, e.g. `verbose = "debug"`
impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let filter = match raw.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            other => return Err(de::Error::custom(format!("invalid log level `{other}`"))),
        };
        Ok(Self::from_filter(filter))
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level_filter())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        verbose: Verbosity,
    }

    fn parse(args: &[&str]) -> LevelFilter {
        let mut argv = vec!["ip-rotator"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).verbose.log_level_filter()
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags() {
        assert_eq!(parse(&[]), LevelFilter::Info);
        assert_eq!(parse(&["-v"]), LevelFilter::Debug);
        assert_eq!(parse(&["-vvvvv"]), LevelFilter::Trace);
        assert_eq!(parse(&["-q"]), LevelFilter::Warn);
        assert_eq!(parse(&["-qqqqq"]), LevelFilter::Off);
    }

    #[test]
    fn test_deserialize_level_name() {
        #[derive(Deserialize)]
        struct File {
            verbose: Verbosity,
        }
        let file: File = toml::from_str(r#"verbose = "Warning""#).unwrap();
        assert_eq!(file.verbose.log_level_filter(), LevelFilter::Warn);
        let file: File = toml::from_str(r#"verbose = "trace""#).unwrap();
        assert_eq!(file.verbose.log_level_filter(), LevelFilter::Trace);
        assert!(toml::from_str::<File>(r#"verbose = "loud""#).is_err());
    }
}
