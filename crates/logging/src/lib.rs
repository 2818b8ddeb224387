#![warn(missing_docs)]

//! Log filtering and log plumbing for chorebot.
//!
//! [`LogArgs`] turns the command line into a filter directive, [`fmt`] renders
//! events as logfmt lines and [`forward`] copies them onto the status stream.

use std::env;

use clap::{ArgAction, Args};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub mod fmt;
pub mod forward;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "CHOREBOT_LOG";

/// Crates whose targets are raised by `-v` and `--log-level`.
const WORKSPACE_TARGETS: &[&str] = &[
    "chorebot",
    "chorebot_engine",
    "chorebot_state",
    "chorebot_protocol",
    "config",
    "gamekey",
    "relaykey",
    "logging",
];

/// Log verbosity flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// More output from chorebot crates: -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Level for chorebot crates (off|error|warn|info|debug|trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LevelFilter>,

    /// Raw filter directive, e.g. "chorebot_engine=trace,config=debug".
    /// Overrides every other setting.
    #[arg(long, global = true, value_name = "DIRECTIVE")]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// The level the flags ask for, if any.
    fn level(&self) -> Option<LevelFilter> {
        match self.verbose {
            0 => self.log_level,
            1 => Some(LevelFilter::DEBUG),
            _ => Some(LevelFilter::TRACE),
        }
    }

    /// Filter directive for these flags.
    ///
    /// `--log-filter` wins, then `-v`/`--log-level`, then [`LOG_ENV`], then
    /// `RUST_LOG`, and finally `info` for our crates.
    pub fn spec(&self) -> String {
        if let Some(filter) = &self.log_filter {
            return filter.clone();
        }
        if let Some(level) = self.level() {
            return workspace_spec(level);
        }
        [LOG_ENV, "RUST_LOG"]
            .iter()
            .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| workspace_spec(LevelFilter::INFO))
    }
}

/// A directive setting `level` on every chorebot crate and leaving others off.
pub fn workspace_spec(level: LevelFilter) -> String {
    let level = level.to_string().to_ascii_lowercase();
    WORKSPACE_TARGETS
        .iter()
        .map(|t| format!("{t}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        log: LogArgs,
    }

    fn spec_of(args: &[&str]) -> String {
        let mut argv = vec!["chorebot"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).log.spec()
    }

    #[test]
    fn explicit_filter_wins() {
        assert_eq!(
            spec_of(&["--log-level", "warn", "--log-filter", "config=trace"]),
            "config=trace"
        );
    }

    #[test]
    fn verbosity_scopes_to_workspace() {
        let spec = spec_of(&["-v"]);
        assert!(spec.contains("chorebot_engine=debug"));
        assert!(spec.contains("relaykey=debug"));
        assert!(!spec.contains("tokio"));
        assert_eq!(spec_of(&["-vvv"]), workspace_spec(LevelFilter::TRACE));
        assert_eq!(
            spec_of(&["--log-level", "WARN"]),
            workspace_spec(LevelFilter::WARN)
        );
    }

    #[test]
    fn verbose_conflicts_with_level() {
        let argv = ["chorebot", "-v", "--log-level", "info"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
