// src/process/supervisor.rs

//! Lifecycle of one supervised child: `init` → `spawn` → `run` → `destroy`.
//!
//! The supervisor owns three stdio pipes and a control pipe. Between `fork`
//! and `exec` the child reports setup failures on the control pipe; its
//! write end is close-on-exec, so a successful launch shows up in the parent
//! as end-of-stream with zero bytes.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::process::ExitStatus;
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::{pthread_sigmask, SigmaskHow};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{debug, error, info, warn, Span};

use super::error::{Result, SupervisorError};
use super::pipe::Pipe;
use super::reap::{self, Reaped, ResourceUsage, WaitOutcome};
use super::sigchld::{sigchld_mask, SigchldBlock};
use crate::config::SupervisorConfig;
use crate::logging::child_span;

pub(super) const STDIN: usize = 0;
pub(super) const STDOUT: usize = 1;
pub(super) const STDERR: usize = 2;

/// Most the parent will read from the control pipe.
const CONTROL_MSG_MAX: u64 = 256;

/// Owner of one child process and the pipes wired to it.
#[derive(Debug)]
pub struct Supervisor {
    pub(super) config: SupervisorConfig,
    pub(super) pid: Option<Pid>,
    control: Pipe,
    pub(super) stdio: [Pipe; 3],
    exit: Option<Reaped>,
    sigchld: Option<SigchldBlock>,
    /// Context for everything logged about the child once it exists.
    pub(super) span: Span,
    spawned: bool,
    initialized: bool,
}

impl Supervisor {
    /// Allocate the stdio and control pipes.
    ///
    /// On error every pipe created so far is closed again.
    pub fn init(config: SupervisorConfig) -> Result<Self> {
        let stdin = Pipe::create().map_err(SupervisorError::setup("pipe(<stdin>)"))?;
        let stdout = Pipe::create().map_err(SupervisorError::setup("pipe(<stdout>)"))?;
        let stderr = Pipe::create().map_err(SupervisorError::setup("pipe(<stderr>)"))?;
        let control = Pipe::create().map_err(SupervisorError::setup("pipe(<ctl>)"))?;

        debug!(
            interactive = config.interactive,
            timeout = ?config.timeout,
            grace = ?config.grace,
            "supervisor initialised"
        );

        Ok(Self {
            config,
            pid: None,
            control,
            stdio: [stdin, stdout, stderr],
            exit: None,
            sigchld: None,
            span: Span::none(),
            spawned: false,
            initialized: true,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The child still awaiting reap, if any.
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    /// Encoded termination status; only set once the child was reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit.map(|r| r.status)
    }

    pub fn rusage(&self) -> Option<ResourceUsage> {
        self.exit.map(|r| r.usage)
    }

    /// Parent side of the child's stdin, while still open.
    pub fn stdin(&self) -> Option<BorrowedFd<'_>> {
        self.stdio[STDIN].write_end()
    }

    /// Signal end-of-input to the child.
    pub fn stdin_close(&mut self) {
        self.stdio[STDIN].close_write();
    }

    /// Launch `argv[0]` (searched in `PATH`) with the given arguments.
    pub fn spawn<S: AsRef<OsStr>>(&mut self, argv: &[S]) -> Result<()> {
        self.spawn_with(argv, None)
    }

    /// Like [`spawn`](Self::spawn), running `cleanup` inside the child after
    /// its descriptors are wired and right before `exec`.
    ///
    /// The hook runs in a freshly forked process: it must stick to
    /// async-signal-safe operations.
    pub fn spawn_with<S: AsRef<OsStr>>(
        &mut self,
        argv: &[S],
        cleanup: Option<&mut dyn FnMut()>,
    ) -> Result<()> {
        if !self.initialized {
            return Err(SupervisorError::Destroyed);
        }
        if self.spawned {
            return Err(SupervisorError::AlreadySpawned);
        }

        let args = argv
            .iter()
            .map(|arg| CString::new(arg.as_ref().as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| {
                SupervisorError::InvalidCommand(format!(
                    "argument contains a NUL byte at offset {}",
                    err.nul_position()
                ))
            })?;
        if args.is_empty() {
            return Err(SupervisorError::InvalidCommand(
                "empty argument vector".to_string(),
            ));
        }

        // Built before forking: the child must not allocate.
        let mut arg_ptrs: Vec<*const libc::c_char> = args.iter().map(|a| a.as_ptr()).collect();
        arg_ptrs.push(ptr::null());

        let devnull = if self.config.interactive {
            None
        } else {
            Some(File::open("/dev/null")?)
        };
        let stdin_fd = match &devnull {
            Some(file) => file.as_raw_fd(),
            None => self.stdio[STDIN].raw_read(),
        };

        let block = SigchldBlock::acquire()
            .map_err(SupervisorError::setup("pthread_sigmask(SIG_BLOCK, SIGCHLD)"))?;
        self.sigchld = Some(block);

        // SAFETY: the child branch only performs async-signal-safe calls
        // before it execs or exits.
        match unsafe { fork() }.map_err(SupervisorError::setup("fork"))? {
            ForkResult::Child => self.exec_child(stdin_fd, &arg_ptrs, cleanup),
            ForkResult::Parent { child } => {
                self.pid = Some(child);
                self.spawned = true;
                drop(devnull);

                self.span = child_span(&args[0].to_string_lossy(), child);
                let _entered = self.span.clone().entered();
                info!("child spawned");

                if let Err(err) = self.await_exec() {
                    error!(error = %err, "child failed to start");
                    if let Err(term_err) = self.terminate() {
                        warn!(error = %term_err, "terminating failed child");
                    }
                    return Err(err);
                }

                debug!("child reached exec");
                Ok(())
            }
        }
    }

    /// Parent half of the launch: drop the child's pipe ends, then wait for
    /// the control pipe to either close silently or carry an error.
    fn await_exec(&mut self) -> Result<()> {
        self.stdio[STDIN].close_read();
        if !self.config.interactive {
            // The child reads /dev/null; nobody would drain this pipe.
            self.stdio[STDIN].close_write();
        }
        self.stdio[STDOUT].close_write();
        self.stdio[STDERR].close_write();
        self.control.close_write();

        let Some(read_end) = self.control.take_read() else {
            return Err(SupervisorError::ControlPipe(std::io::Error::other(
                "control pipe already closed",
            )));
        };

        let mut msg = Vec::new();
        File::from(read_end)
            .take(CONTROL_MSG_MAX)
            .read_to_end(&mut msg)
            .map_err(SupervisorError::ControlPipe)?;

        if msg.is_empty() {
            Ok(())
        } else {
            Err(parse_launch_failure(&msg))
        }
    }

    /// Child half of the launch. Never returns.
    fn exec_child(
        &mut self,
        stdin_fd: RawFd,
        argv: &[*const libc::c_char],
        cleanup: Option<&mut dyn FnMut()>,
    ) -> ! {
        let ctl = self.control.raw_write();

        if !wire(stdin_fd, libc::STDIN_FILENO)
            || !wire(self.stdio[STDOUT].raw_write(), libc::STDOUT_FILENO)
            || !wire(self.stdio[STDERR].raw_write(), libc::STDERR_FILENO)
        {
            child_abort(ctl, "E:dup2:");
        }

        // The wired copies live on 0/1/2 now; the control write end stays
        // until exec closes it.
        self.control.close_read();
        for pipe in &mut self.stdio {
            close_keeping_stdio(pipe);
        }

        if !SigchldBlock::was_blocked() {
            // The program should not inherit the supervisor's mask.
            if pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&sigchld_mask()), None).is_err() {
                child_abort(ctl, "E:sigprocmask:");
            }
        }

        // The Rust runtime ignores SIGPIPE and exec keeps ignored
        // dispositions.
        // SAFETY: `signal` is async-signal-safe.
        if unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) } == libc::SIG_ERR {
            child_abort(ctl, "E:signal:");
        }

        if let Some(hook) = cleanup {
            hook();
        }

        // SAFETY: `argv` is a NULL-terminated array of pointers into
        // CStrings that outlive this call.
        unsafe {
            libc::execvp(argv[0], argv.as_ptr());
        }
        child_abort(ctl, "E:execvp:")
    }

    /// Non-blocking (or blocking) reap of the current child.
    ///
    /// Returns `true` once the child is gone and its status recorded.
    pub(super) fn try_reap(&mut self, nohang: bool) -> Result<bool> {
        let Some(pid) = self.pid else {
            return Ok(true);
        };

        match reap::wait4(pid, nohang) {
            Ok(WaitOutcome::Reaped(reaped)) => {
                debug!(
                    status = ?reaped.status,
                    user = ?reaped.usage.user_time,
                    system = ?reaped.usage.system_time,
                    "child reaped"
                );
                self.exit = Some(reaped);
                self.pid = None;
                Ok(true)
            }
            Ok(WaitOutcome::Running) => Ok(false),
            Ok(WaitOutcome::Foreign(got)) => Err(SupervisorError::ReapMismatch {
                expected: pid.as_raw(),
                got: got.as_raw(),
            }),
            Err(source) => Err(SupervisorError::Reap {
                pid: pid.as_raw(),
                source,
            }),
        }
    }

    /// Close every descriptor, reap an outstanding child (blocking), and
    /// restore the SIGCHLD mask. Safe to call more than once.
    pub fn destroy(&mut self) {
        if !self.initialized {
            return;
        }

        let _entered = self.span.clone().entered();
        self.control.close();
        for pipe in self.stdio.iter_mut().rev() {
            pipe.close();
        }

        if self.pid.is_some() {
            if let Err(err) = self.try_reap(false) {
                error!(error = %err, "waitpid() during teardown");
            }
        }
        self.pid = None;
        self.sigchld = None;
        self.initialized = false;

        debug!("supervisor destroyed");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Decode `E:<code>:<detail>` as written by [`child_abort`].
fn parse_launch_failure(msg: &[u8]) -> SupervisorError {
    let text = String::from_utf8_lossy(msg);
    let (code, detail) = text
        .strip_prefix("E:")
        .and_then(|rest| rest.split_once(':'))
        .map(|(code, detail)| (code.to_string(), detail.to_string()))
        .unwrap_or_else(|| ("unknown".to_string(), text.to_string()));

    SupervisorError::Launch { code, detail }
}

/// Make `fd` available as `target` across exec.
fn wire(fd: RawFd, target: RawFd) -> bool {
    // SAFETY: plain descriptor syscalls; failure is reported via errno.
    unsafe {
        if fd == target {
            libc::fcntl(fd, libc::F_SETFD, 0) >= 0
        } else {
            libc::dup2(fd, target) >= 0
        }
    }
}

/// Drop both ends of `pipe`, except an end that already sits on 0/1/2.
fn close_keeping_stdio(pipe: &mut Pipe) {
    for fd in [pipe.take_read(), pipe.take_write()].into_iter().flatten() {
        if fd.as_raw_fd() <= libc::STDERR_FILENO {
            let _ = fd.into_raw_fd();
        } else {
            drop(fd);
        }
    }
}

/// Report a child-side setup failure and exit. Allocation free.
fn child_abort(ctl: RawFd, code: &str) -> ! {
    let errno = Errno::last();
    write_all_raw(ctl, code.as_bytes());
    write_all_raw(ctl, errno.desc().as_bytes());

    // SAFETY: terminates the forked child without running parent destructors.
    unsafe { libc::_exit(1) }
}

fn write_all_raw(fd: RawFd, mut buf: &[u8]) {
    while !buf.is_empty() {
        // SAFETY: `buf` is valid for `buf.len()` bytes.
        let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        match Errno::result(rc) {
            Ok(n) => buf = &buf[n as usize..],
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
}
