// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod harness;
pub mod logging;
pub mod process;

use std::io;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, SupervisorConfig};
use crate::errors::Result;
use crate::harness::{pump_stdin, SpliceHandler, Verdict};
use crate::process::Supervisor;

/// High-level entry point used by `main.rs`.
///
/// Resolves settings, runs `args.command` under a [`Supervisor`] with its
/// output spliced onto ours, and judges the outcome. A timeout or a launch
/// failure comes back as `Err`; [`Verdict::from_error`] maps it to an exit
/// code.
pub fn run(args: &CliArgs) -> Result<Verdict> {
    if let Some(reason) = &args.skip {
        eprintln!("SKIP: {reason}");
        info!(%reason, "test skipped");
        return Ok(Verdict::Skip);
    }

    let config = resolve_config(args)?;
    let mut supervisor = Supervisor::init(config)?;
    supervisor.spawn(&args.command)?;

    if config.interactive {
        if let Some(stdin) = supervisor.stdin() {
            pump_stdin(stdin.try_clone_to_owned()?)?;
            // The pump holds its own copy; ours would keep the child from
            // ever seeing EOF.
            supervisor.stdin_close();
        }
    }

    let mut handler = SpliceHandler::new(io::stdout().lock(), io::stderr().lock());
    let outcome = supervisor.run(&mut handler, None);
    let usage = supervisor.rusage();
    supervisor.destroy();

    if let Err(err) = handler.finish() {
        warn!(error = %err, "forwarding child output failed");
        return Err(err.into());
    }

    let status = outcome?;
    let verdict = Verdict::from_status(status, args.fail);
    info!(?status, ?verdict, "test finished");
    if let Some(usage) = usage {
        debug!(
            user = ?usage.user_time,
            system = ?usage.system_time,
            max_rss_kib = usage.max_rss_kib,
            "child resource usage"
        );
    }

    Ok(verdict)
}

/// Config file (if any), then command-line overrides, then validation.
pub fn resolve_config(args: &CliArgs) -> Result<SupervisorConfig> {
    let mut config = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => SupervisorConfig::default(),
    };

    if args.interactive {
        config.interactive = true;
    }
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.grace {
        config.grace = Duration::from_secs(secs);
    }

    config.validate()?;
    Ok(config)
}
