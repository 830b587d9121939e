// src/harness/verdict.rs

//! Mapping of run outcomes to sysexits-style process exit codes.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use crate::errors::RuntestError;
use crate::process::SupervisorError;

/// Outcome of one supervised test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Bad arguments or configuration (`EX_USAGE`).
    Usage,
    /// The OS refused something: pipes, fork, exec, waiting (`EX_IOERR`).
    IoError,
    /// Timed out, aborted, or killed by a signal (`EX_TEMPFAIL`).
    TempFail,
    Skip,
}

impl Verdict {
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
            Verdict::Usage => 64,
            Verdict::IoError => 74,
            Verdict::TempFail => 75,
            Verdict::Skip => 77,
        }
    }

    /// Judge a reaped child. With `expect_fail` a nonzero exit code passes
    /// and a zero one fails; death by signal is never a pass.
    pub fn from_status(status: ExitStatus, expect_fail: bool) -> Self {
        if status.signal().is_some() {
            return Verdict::TempFail;
        }
        match (status.code() == Some(0), expect_fail) {
            (true, false) | (false, true) => Verdict::Pass,
            (true, true) | (false, false) => Verdict::Fail,
        }
    }

    pub fn from_supervisor_error(err: &SupervisorError) -> Self {
        match err {
            SupervisorError::TimedOut(_) | SupervisorError::Aborted => Verdict::TempFail,
            SupervisorError::InvalidCommand(_) => Verdict::Usage,
            _ => Verdict::IoError,
        }
    }

    pub fn from_error(err: &RuntestError) -> Self {
        match err {
            RuntestError::ConfigError(_) | RuntestError::TomlError(_) => Verdict::Usage,
            RuntestError::Supervisor(err) => Verdict::from_supervisor_error(err),
            RuntestError::IoError(_) => Verdict::IoError,
        }
    }
}
