// src/process/reap.rs

//! Collecting a child's exit status and resource usage.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Resource accounting of a reaped child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub user_time: Duration,
    pub system_time: Duration,
    /// Peak resident set size in KiB.
    pub max_rss_kib: u64,
}

impl ResourceUsage {
    fn from_raw(usage: &libc::rusage) -> Self {
        Self {
            user_time: timeval_to_duration(usage.ru_utime),
            system_time: timeval_to_duration(usage.ru_stime),
            max_rss_kib: u64::try_from(usage.ru_maxrss).unwrap_or(0),
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u32::try_from(tv.tv_usec).unwrap_or(0);
    Duration::new(secs, micros.saturating_mul(1_000))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reaped {
    pub status: ExitStatus,
    pub usage: ResourceUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Reaped(Reaped),
    /// `WNOHANG` and the child has not changed state.
    Running,
    /// The kernel handed back somebody else.
    Foreign(Pid),
}

/// `wait4(2)` on exactly `pid`, blocking unless `nohang`.
pub(crate) fn wait4(pid: Pid, nohang: bool) -> nix::Result<WaitOutcome> {
    let options = if nohang { libc::WNOHANG } else { 0 };
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data, all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        // SAFETY: both out-pointers are valid for the duration of the call.
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut status, options, &mut usage) };
        match Errno::result(rc) {
            Ok(0) => return Ok(WaitOutcome::Running),
            Ok(got) if got == pid.as_raw() => {
                return Ok(WaitOutcome::Reaped(Reaped {
                    status: ExitStatus::from_raw(status),
                    usage: ResourceUsage::from_raw(&usage),
                }));
            }
            Ok(got) => return Ok(WaitOutcome::Foreign(Pid::from_raw(got))),
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Whether `pid` has exited, without reaping it.
pub(crate) fn has_exited(pid: Pid) -> nix::Result<bool> {
    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
    loop {
        match waitid(Id::Pid(pid), flags) {
            Ok(WaitStatus::StillAlive) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_conversion_keeps_micros() {
        let tv = libc::timeval {
            tv_sec: 2,
            tv_usec: 500_000,
        };
        assert_eq!(timeval_to_duration(tv), Duration::from_millis(2_500));
    }

    #[test]
    fn negative_fields_clamp_to_zero() {
        let tv = libc::timeval {
            tv_sec: -1,
            tv_usec: -1,
        };
        assert_eq!(timeval_to_duration(tv), Duration::ZERO);
    }
}
