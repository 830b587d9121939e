// src/logging.rs

//! Logging setup for `runtest` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `RUNTEST_LOG` environment variable: a level ("info", "debug") or
//!    full filter directives (`warn,runtest::process=trace`)
//! 3. default to `warn`
//!
//! Logs go to STDERR: stdout carries the child's forwarded output. Events
//! about a supervised child are recorded inside its [`child_span`], so every
//! line names the program and pid it belongs to.

use anyhow::Result;
use nix::unistd::Pid;
use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "RUNTEST_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("installing tracing subscriber: {err}"))?;

    Ok(())
}

/// Resolve the filter from the flag and the raw `RUNTEST_LOG` value.
pub fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level_directive(level));
    }

    let Some(raw) = env.map(str::trim).filter(|s| !s.is_empty()) else {
        return EnvFilter::new(DEFAULT_DIRECTIVES);
    };
    match parse_level_str(raw) {
        Some(level) => EnvFilter::new(level_directive(level)),
        None => EnvFilter::try_new(raw).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
    }
}

/// Span wrapping everything logged about one supervised child.
pub fn child_span(program: &str, pid: Pid) -> Span {
    tracing::info_span!("child", program = %program, pid = %pid)
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<LogLevel> {
    match s.to_lowercase().as_str() {
        "error" => Some(LogLevel::Error),
        "warn" | "warning" => Some(LogLevel::Warn),
        "info" => Some(LogLevel::Info),
        "debug" => Some(LogLevel::Debug),
        "trace" => Some(LogLevel::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("trace"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn env_levels_are_case_insensitive() {
        assert_eq!(build_filter(None, Some(" DEBUG ")).to_string(), "debug");
        assert_eq!(build_filter(None, Some("warning")).to_string(), "warn");
    }

    #[test]
    fn env_accepts_target_directives() {
        let filter = build_filter(None, Some("warn,runtest::process=trace"));
        assert!(filter.to_string().contains("runtest::process=trace"));
    }

    #[test]
    fn missing_env_falls_back_to_warn() {
        assert_eq!(build_filter(None, None).to_string(), "warn");
        assert_eq!(build_filter(None, Some("  ")).to_string(), "warn");
    }

    #[test]
    fn child_span_carries_program_and_pid() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = child_span("sh", Pid::from_raw(42));
            let meta = span.metadata().expect("span enabled");

            assert_eq!(meta.name(), "child");
            assert!(meta.fields().field("program").is_some());
            assert!(meta.fields().field("pid").is_some());
        });
    }
}
