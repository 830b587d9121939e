// src/process/run_loop.rs

//! The supervision reactor.
//!
//! One `epoll` instance watches the child's stdio pipes, an optional
//! caller-supplied monitor descriptor, a deadline timer and an exit
//! notifier (a pidfd, or a `SIGCHLD` signalfd on older kernels). Every
//! iteration the caller's [`RunHandler::step`] declares which
//! descriptor sources it cares about; the loop diffs that against what is
//! registered, waits, and dispatches ready sources in [`Source`] order.
//!
//! Within one readiness batch, real I/O goes first. An exit notification is
//! held back while I/O was dispatched in the same batch, so a child's final
//! output is drained before its exit is reported. Delivering the timeout or
//! the exit source ends the loop.

use std::os::fd::BorrowedFd;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::timerfd::TimerFd;
use nix::unistd::Pid;
use tracing::{debug, error, info, trace, warn};

use super::error::{Result, SupervisorError};
use super::notify::{deadline_timer, ExitNotifier};
use super::reap;
use super::source::{Source, SourceSet};
use super::supervisor::{Supervisor, STDERR, STDIN, STDOUT};
use crate::config::ExitNotification;

/// Caller side of [`Supervisor::run`].
pub trait RunHandler {
    /// Declare interest for the next wait. Not called before the first one,
    /// which watches every descriptor source.
    fn step(&mut self) -> Step;

    /// A source became ready. `fd` is `None` for [`Source::Timeout`] and
    /// [`Source::Exit`].
    fn handle(&mut self, fd: Option<BorrowedFd<'_>>, source: Source);
}

/// Result of [`RunHandler::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    interest: SourceSet,
    quit: bool,
    close_stdin: bool,
}

impl Step {
    /// Watch exactly these descriptor sources next.
    pub fn watch(interest: SourceSet) -> Self {
        Self {
            interest,
            ..Self::default()
        }
    }

    /// Stop supervising right away.
    pub fn quit() -> Self {
        Self {
            quit: true,
            ..Self::default()
        }
    }

    /// Also close the child's stdin before waiting.
    pub fn and_close_stdin(mut self) -> Self {
        self.close_stdin = true;
        self
    }

    pub fn interest(&self) -> SourceSet {
        self.interest
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    pub fn closes_stdin(&self) -> bool {
        self.close_stdin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Timeout,
    Exit,
    Quit,
}

/// Multiplexer plus the two synthetic sources registered in it.
struct Reactor {
    epoll: Epoll,
    notifier: ExitNotifier,
    _timer: TimerFd,
}

impl Reactor {
    fn arm(timeout: Duration, pid: Pid, kind: ExitNotification) -> Result<Self> {
        let notifier =
            ExitNotifier::open(pid, kind).map_err(SupervisorError::setup("exit notifier"))?;
        debug!(notifier = ?notifier.kind(), "exit notifier armed");
        let timer = deadline_timer(timeout).map_err(SupervisorError::setup("timerfd()"))?;
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(SupervisorError::setup("epoll_create()"))?;

        epoll
            .add(
                &notifier,
                EpollEvent::new(EpollFlags::EPOLLIN, Source::Exit.token()),
            )
            .map_err(SupervisorError::setup("epoll_ctl(<exit>)"))?;
        epoll
            .add(
                &timer,
                EpollEvent::new(EpollFlags::EPOLLIN, Source::Timeout.token()),
            )
            .map_err(SupervisorError::setup("epoll_ctl(<timer_fd>)"))?;

        Ok(Self {
            epoll,
            notifier,
            _timer: timer,
        })
    }
}

impl Supervisor {
    /// Supervise the spawned child until it exits, the deadline passes, or
    /// `handler` asks to quit.
    ///
    /// On success the child has been reaped and its status is returned. On
    /// every error path a child that is still around is escalated
    /// ([`terminate`](Self::terminate)) before returning, so the caller never
    /// inherits an unsignaled child.
    pub fn run<H: RunHandler + ?Sized>(
        &mut self,
        handler: &mut H,
        monitor: Option<BorrowedFd<'_>>,
    ) -> Result<ExitStatus> {
        let Some(pid) = self.pid else {
            return Err(SupervisorError::NotSpawned);
        };
        let timeout = self.config.timeout;
        let _entered = self.span.clone().entered();

        let end = Reactor::arm(timeout, pid, self.config.exit_notification).and_then(|mut reactor| {
            self.drive(&mut reactor, handler, monitor, pid)
        });

        let result = match end {
            Ok(LoopEnd::Quit) => Err(SupervisorError::Aborted),
            Ok(end) => match self.try_reap(true) {
                Ok(true) => Ok(()),
                Ok(false) if end == LoopEnd::Timeout => Err(SupervisorError::TimedOut(timeout)),
                Ok(false) => Err(SupervisorError::NotReaped { pid: pid.as_raw() }),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => self
                .exit_status()
                .ok_or(SupervisorError::NotReaped { pid: pid.as_raw() }),
            Err(err) => {
                if self.pid.is_some() {
                    warn!(error = %err, "supervision ended abnormally, escalating");
                    if let Err(term_err) = self.terminate() {
                        error!(error = %term_err, "escalation failed");
                    }
                }
                Err(err)
            }
        }
    }

    fn drive<H: RunHandler + ?Sized>(
        &mut self,
        reactor: &mut Reactor,
        handler: &mut H,
        monitor: Option<BorrowedFd<'_>>,
        pid: Pid,
    ) -> Result<LoopEnd> {
        // Loses members for good on hang-up, error or close.
        let mut open = SourceSet::io();
        let mut registered = SourceSet::empty();
        let mut first = true;
        let mut events = [EpollEvent::empty(); Source::ALL.len()];

        loop {
            let wanted = if first {
                first = false;
                SourceSet::io()
            } else {
                let step = handler.step();
                if step.is_quit() {
                    debug!("handler requested quit");
                    return Ok(LoopEnd::Quit);
                }
                if step.closes_stdin() {
                    if registered.remove(Source::Stdin) {
                        self.unwatch(&reactor.epoll, Source::Stdin, monitor)?;
                    }
                    self.stdin_close();
                    open.remove(Source::Stdin);
                    debug!("child stdin closed");
                }
                step.interest()
            };

            let interest: SourceSet = wanted
                .intersection(open)
                .iter()
                .filter(|source| self.source_fd(*source, monitor).is_some())
                .collect();
            self.update_interest(&reactor.epoll, monitor, registered, interest)?;
            registered = interest;

            let n = loop {
                match reactor.epoll.wait(&mut events, EpollTimeout::NONE) {
                    Ok(n) => break n,
                    Err(Errno::EINTR) => continue,
                    Err(err) => {
                        error!(error = %err, "epoll_wait() failed");
                        return Err(SupervisorError::Wait(err));
                    }
                }
            };

            let mut ready = SourceSet::empty();
            for event in &events[..n] {
                let Some(source) = Source::from_token(event.data()) else {
                    warn!(token = event.data(), "event for unknown source");
                    continue;
                };
                let flags = event.events();
                if (flags == EpollFlags::EPOLLHUP || flags.contains(EpollFlags::EPOLLERR))
                    && open.remove(source)
                {
                    debug!(%source, ?flags, "source hung up");
                }
                ready.insert(source);
            }
            trace!(?ready, ?registered, "readiness batch");

            if let Some(end) = self.dispatch(reactor, handler, monitor, ready, pid)? {
                return Ok(end);
            }
        }
    }

    /// Hand one readiness batch to `handler`. `Some` ends the loop.
    fn dispatch<H: RunHandler + ?Sized>(
        &self,
        reactor: &mut Reactor,
        handler: &mut H,
        monitor: Option<BorrowedFd<'_>>,
        ready: SourceSet,
        pid: Pid,
    ) -> Result<Option<LoopEnd>> {
        let mut dispatched_io = false;

        for source in ready.iter() {
            match source {
                Source::Timeout => {
                    info!(timeout = ?self.config.timeout, "supervision deadline reached");
                    handler.handle(None, Source::Timeout);
                    return Ok(Some(LoopEnd::Timeout));
                }
                Source::Exit => {
                    if dispatched_io {
                        // Still pending next round; output comes first.
                        continue;
                    }
                    reactor.notifier.drain();
                    let exited = reap::has_exited(pid).map_err(|source| SupervisorError::Reap {
                        pid: pid.as_raw(),
                        source,
                    })?;
                    if !exited {
                        trace!("exit notification for another child");
                        continue;
                    }
                    debug!("child exited");
                    handler.handle(None, Source::Exit);
                    return Ok(Some(LoopEnd::Exit));
                }
                io => {
                    dispatched_io = true;
                    handler.handle(self.source_fd(io, monitor), io);
                }
            }
        }

        Ok(None)
    }

    /// Apply exactly one add or remove per source whose membership changed.
    fn update_interest(
        &self,
        epoll: &Epoll,
        monitor: Option<BorrowedFd<'_>>,
        registered: SourceSet,
        interest: SourceSet,
    ) -> Result<()> {
        for source in registered.changed(interest).iter() {
            if interest.contains(source) {
                let Some(fd) = self.source_fd(source, monitor) else {
                    continue;
                };
                let flags = if source.is_output() {
                    EpollFlags::EPOLLOUT
                } else {
                    EpollFlags::EPOLLIN
                };
                epoll
                    .add(fd, EpollEvent::new(flags, source.token()))
                    .map_err(SupervisorError::setup("epoll_ctl(EPOLL_CTL_ADD)"))?;
                trace!(%source, "watching");
            } else {
                self.unwatch(epoll, source, monitor)?;
            }
        }
        Ok(())
    }

    fn unwatch(
        &self,
        epoll: &Epoll,
        source: Source,
        monitor: Option<BorrowedFd<'_>>,
    ) -> Result<()> {
        let Some(fd) = self.source_fd(source, monitor) else {
            return Ok(());
        };
        match epoll.delete(fd) {
            // Already gone from the interest list is fine.
            Ok(()) | Err(Errno::ENOENT) => {
                trace!(%source, "unwatched");
                Ok(())
            }
            Err(err) => Err(SupervisorError::Setup {
                what: "epoll_ctl(EPOLL_CTL_DEL)",
                source: err,
            }),
        }
    }

    fn source_fd<'a>(
        &'a self,
        source: Source,
        monitor: Option<BorrowedFd<'a>>,
    ) -> Option<BorrowedFd<'a>> {
        match source {
            Source::Monitor => monitor,
            Source::Stdin => self.stdio[STDIN].write_end(),
            Source::Stdout => self.stdio[STDOUT].read_end(),
            Source::Stderr => self.stdio[STDERR].read_end(),
            Source::Timeout | Source::Exit => None,
        }
    }
}
