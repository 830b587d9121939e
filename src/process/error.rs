// src/process/error.rs

//! Errors raised while supervising a child.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Allocating or configuring a pipe, timer, notifier or multiplexer.
    #[error("{what} failed: {source}")]
    Setup {
        what: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("supervisor already spawned a child")]
    AlreadySpawned,

    #[error("supervisor has been destroyed")]
    Destroyed,

    #[error("no child to supervise")]
    NotSpawned,

    /// The child failed between `fork` and `exec` and said so on the
    /// control pipe.
    #[error("child setup failed at {code}: {detail}")]
    Launch { code: String, detail: String },

    #[error("reading control pipe: {0}")]
    ControlPipe(#[source] io::Error),

    #[error("waiting for events: {0}")]
    Wait(#[source] nix::Error),

    #[error("child still running after {0:?}")]
    TimedOut(Duration),

    #[error("supervision aborted by caller")]
    Aborted,

    #[error("child {pid} not reapable after exit notification")]
    NotReaped { pid: i32 },

    #[error("reaped pid {got} while waiting for {expected}")]
    ReapMismatch { expected: i32, got: i32 },

    #[error("waiting for child {pid}: {source}")]
    Reap {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SupervisorError {
    pub(crate) fn setup(what: &'static str) -> impl FnOnce(nix::Error) -> Self {
        move |source| SupervisorError::Setup { what, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SupervisorError::TimedOut(_))
    }

    /// The requested program never started running.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::Launch { .. } | SupervisorError::ControlPipe(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
