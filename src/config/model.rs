// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Default supervision deadline for one run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default window between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// timeout_secs = 10
/// grace_secs = 2
/// interactive = false
/// exit_notification = "pidfd"
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// Whole-run deadline, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Time the child gets to honour SIGTERM before SIGKILL, in seconds.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Give the child a stdin pipe instead of `/dev/null`.
    #[serde(default)]
    pub interactive: bool,

    #[serde(default)]
    pub exit_notification: ExitNotification,
}

/// How the supervisor learns that its child exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitNotification {
    /// A pidfd for the child; `sigchld` on kernels without `pidfd_open`.
    #[default]
    Pidfd,
    /// A `SIGCHLD` signalfd. Every child of the process wakes it, so each
    /// wake-up is checked against the supervised pid. Other threads that
    /// leave `SIGCHLD` unblocked can consume the signal first, in which case
    /// the exit is only noticed at the deadline.
    Sigchld,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_grace_secs() -> u64 {
    DEFAULT_GRACE.as_secs()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_secs: default_grace_secs(),
            interactive: false,
            exit_notification: ExitNotification::default(),
        }
    }
}

/// Validated settings for one [`Supervisor`](crate::process::Supervisor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub interactive: bool,
    pub timeout: Duration,
    pub grace: Duration,
    pub exit_notification: ExitNotification,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            exit_notification: ExitNotification::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn exit_notification(mut self, kind: ExitNotification) -> Self {
        self.exit_notification = kind;
        self
    }
}
