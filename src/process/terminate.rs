// src/process/terminate.rs

//! Escalating shutdown: SIGTERM, a grace window, then SIGKILL.

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::signal::{kill, Signal};
use nix::sys::timerfd::TimerFd;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::error::{Result, SupervisorError};
use super::notify::{deadline_timer, ExitNotifier};
use super::reap;
use super::source::{Source, SourceSet};
use super::supervisor::Supervisor;
use crate::config::ExitNotification;

impl Supervisor {
    /// Bring the child down and reap it.
    ///
    /// A child that already exited is simply reaped. Otherwise it gets
    /// SIGTERM and `config.grace` to exit before SIGKILL follows. Always
    /// ends with a blocking reap, so on `Ok` the child is gone.
    pub fn terminate(&mut self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let _entered = self.span.clone().entered();

        if self.try_reap(true)? {
            debug!("child had already exited");
            return Ok(());
        }

        let grace = self.config.grace;
        match GraceWindow::arm(grace, pid, self.config.exit_notification) {
            Ok(mut window) => {
                // Notifications queued earlier say nothing about SIGTERM.
                window.notifier.drain();
                send(pid, Signal::SIGTERM);

                if window.wait_for_exit(pid) {
                    debug!("child exited within grace window");
                } else {
                    warn!(?grace, "grace window elapsed");
                    send(pid, Signal::SIGKILL);
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot arm grace window, killing outright");
                send(pid, Signal::SIGKILL);
            }
        }

        if self.try_reap(false)? {
            Ok(())
        } else {
            Err(SupervisorError::NotReaped { pid: pid.as_raw() })
        }
    }
}

fn send(pid: Pid, signal: Signal) {
    match kill(pid, signal) {
        Ok(()) => info!(?signal, "signal sent"),
        Err(err) => warn!(?signal, error = %err, "kill() failed"),
    }
}

/// The grace deadline and the exit notifier, multiplexed.
struct GraceWindow {
    epoll: Epoll,
    notifier: ExitNotifier,
    // Registered in `epoll`; kept alive for the window's duration.
    _timer: TimerFd,
}

impl GraceWindow {
    fn arm(grace: std::time::Duration, pid: Pid, kind: ExitNotification) -> nix::Result<Self> {
        let notifier = ExitNotifier::open(pid, kind)?;
        let timer = deadline_timer(grace)?;
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        epoll.add(
            &notifier,
            EpollEvent::new(EpollFlags::EPOLLIN, Source::Exit.token()),
        )?;
        epoll.add(
            &timer,
            EpollEvent::new(EpollFlags::EPOLLIN, Source::Timeout.token()),
        )?;

        Ok(Self {
            epoll,
            notifier,
            _timer: timer,
        })
    }

    /// `true` if `pid` exited before the deadline.
    fn wait_for_exit(&mut self, pid: Pid) -> bool {
        let mut events = [EpollEvent::empty(); 2];

        // An exit that raced the drain leaves no notification behind.
        if let Ok(true) = reap::has_exited(pid) {
            return true;
        }

        loop {
            let n = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    warn!(error = %err, "epoll_wait() during grace window");
                    return false;
                }
            };

            let ready: SourceSet = events[..n]
                .iter()
                .filter_map(|ev| Source::from_token(ev.data()))
                .collect();

            if ready.contains(Source::Exit) {
                self.notifier.drain();
                match reap::has_exited(pid) {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(error = %err, "waitid() during grace window");
                        return false;
                    }
                }
            }

            if ready.contains(Source::Timeout) {
                return false;
            }
        }
    }
}
