// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `blogpilot`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "blogpilot",
    version,
    about = "Run an ordered plan of blogging automation tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the run plan (TOML).
    #[arg(long, value_name = "PATH", default_value = "Blogpilot.toml")]
    pub plan: String,

    /// Parse + validate, print the plan, but don't run any task.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[engine].concurrency`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BLOGPILOT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Append every run event as a JSON line to this file.
    #[arg(long, value_name = "PATH")]
    pub run_log: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let args = CliArgs::parse_from(["blogpilot"]);
        assert_eq!(args.plan, "Blogpilot.toml");
        assert!(!args.dry_run);
        assert!(args.concurrency.is_none());

        let args = CliArgs::parse_from([
            "blogpilot",
            "--plan",
            "plans/morning.toml",
            "--concurrency",
            "2",
            "--log-level",
            "debug",
            "--run-log",
            "run.jsonl",
        ]);
        assert_eq!(args.plan, "plans/morning.toml");
        assert_eq!(args.concurrency, Some(2));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert_eq!(args.run_log.as_deref(), Some("run.jsonl"));
    }

    #[test]
    fn concurrency_outside_the_engine_bounds_is_rejected() {
        assert!(CliArgs::try_parse_from(["blogpilot", "--concurrency", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["blogpilot", "--concurrency", "65"]).is_err());
        assert!(CliArgs::try_parse_from(["blogpilot", "--concurrency", "64"]).is_ok());
    }
}
