// src/cli.rs

//! CLI argument parsing using `clap`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `runtest`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runtest",
    version,
    about = "Run one test program under supervision and report pass/fail through the exit code.",
    long_about = None
)]
pub struct CliArgs {
    /// The test is expected to fail: a nonzero exit status counts as a pass.
    #[arg(short = 'f', long)]
    pub fail: bool,

    /// Skip the test, printing the reason; nothing is run.
    #[arg(short = 's', long, value_name = "REASON")]
    pub skip: Option<String>,

    /// Feed the child's stdin from our own stdin instead of /dev/null.
    #[arg(short = 'I', long)]
    pub interactive: bool,

    /// Seconds the child may run before it is terminated.
    ///
    /// Overrides `timeout_secs` from the config file (default 10).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds between SIGTERM and SIGKILL when terminating (default 2).
    #[arg(long, value_name = "SECS")]
    pub grace: Option<u64>,

    /// Optional TOML file with a `[supervisor]` section.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNTEST_LOG` or `warn` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Program to run, followed by its arguments.
    #[arg(
        value_name = "PROGRAM",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "skip"
    )]
    pub command: Vec<OsString>,
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

/// Parse the process arguments, leaving error reporting to the caller.
pub fn try_parse() -> Result<CliArgs, clap::Error> {
    CliArgs::try_parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
        CliArgs::try_parse_from(std::iter::once("runtest").chain(args.iter().copied()))
    }

    #[test]
    fn command_after_separator_keeps_its_flags() {
        let args = parse(&["--fail", "--timeout", "3", "--", "ls", "-l", "--all"]).unwrap();

        assert!(args.fail);
        assert_eq!(args.timeout, Some(3));
        assert_eq!(args.command, ["ls", "-l", "--all"]);
    }

    #[test]
    fn program_is_required_unless_skipping() {
        assert!(parse(&["--fail"]).is_err());

        let args = parse(&["--skip", "needs root"]).unwrap();
        assert_eq!(args.skip.as_deref(), Some("needs root"));
        assert!(args.command.is_empty());
    }

    #[test]
    fn log_level_is_a_closed_set() {
        assert!(matches!(
            parse(&["--log-level", "debug", "true"]).unwrap().log_level,
            Some(LogLevel::Debug)
        ));
        assert!(parse(&["--log-level", "loud", "true"]).is_err());
    }
}
