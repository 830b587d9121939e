// src/process/notify.rs

//! Descriptor-backed wake-up sources shared by the run loop and escalation.

use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use nix::unistd::Pid;
use tracing::debug;

use super::sigchld::sigchld_mask;
use crate::config::ExitNotification;

/// Readable once the child changed state.
pub(super) enum ExitNotifier {
    /// `pidfd_open(2)`: readable exactly when this child has exited.
    Pidfd(OwnedFd),
    /// `SIGCHLD` signalfd. Fires for any child and only sees anything while
    /// the signal is blocked on this thread.
    Signal(SignalFd),
}

impl ExitNotifier {
    pub(super) fn open(pid: Pid, kind: ExitNotification) -> nix::Result<Self> {
        if kind == ExitNotification::Sigchld {
            return Self::sigchld();
        }
        match pidfd_open(pid) {
            Ok(fd) => Ok(Self::Pidfd(fd)),
            Err(err @ (Errno::ENOSYS | Errno::EPERM)) => {
                debug!(error = %err, "pidfd_open() unavailable, using SIGCHLD signalfd");
                Self::sigchld()
            }
            Err(err) => Err(err),
        }
    }

    fn sigchld() -> nix::Result<Self> {
        let fd = SignalFd::with_flags(
            &sigchld_mask(),
            SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC,
        )?;
        Ok(Self::Signal(fd))
    }

    pub(super) fn kind(&self) -> ExitNotification {
        match self {
            Self::Pidfd(_) => ExitNotification::Pidfd,
            Self::Signal(_) => ExitNotification::Sigchld,
        }
    }

    /// Consume every queued notification; returns how many there were.
    ///
    /// A pidfd has nothing to consume and stays readable after the exit.
    pub(super) fn drain(&mut self) -> usize {
        match self {
            Self::Pidfd(_) => 0,
            Self::Signal(fd) => {
                let mut drained = 0;
                while let Ok(Some(_)) = fd.read_signal() {
                    drained += 1;
                }
                drained
            }
        }
    }
}

impl AsFd for ExitNotifier {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Self::Pidfd(fd) => fd.as_fd(),
            Self::Signal(fd) => fd.as_fd(),
        }
    }
}

fn pidfd_open(pid: Pid) -> nix::Result<OwnedFd> {
    // SAFETY: plain syscall with integer arguments. A pidfd is always
    // close-on-exec.
    let rc = unsafe { libc::syscall(libc::SYS_pidfd_open, pid.as_raw(), 0) };
    let fd = Errno::result(rc)?;
    // SAFETY: the kernel just handed us this descriptor and nobody else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// One-shot `CLOCK_MONOTONIC` timer that becomes readable after `after`.
pub(super) fn deadline_timer(after: Duration) -> nix::Result<TimerFd> {
    let timer = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_CLOEXEC)?;
    timer.set(
        Expiration::OneShot(TimeSpec::from_duration(after)),
        TimerSetTimeFlags::empty(),
    )?;
    Ok(timer)
}
