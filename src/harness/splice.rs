// src/harness/splice.rs

//! A [`RunHandler`] that copies the child's stdout/stderr into two writers.

use std::io::{self, Write};
use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use tracing::{debug, trace, warn};

use crate::process::{read_fd, RunHandler, Source, SourceSet, Step};

const CHUNK: usize = 8192;

pub struct SpliceHandler<O, E> {
    stdout: O,
    stderr: E,
    buf: Vec<u8>,
    forwarded: [u64; 2],
    failure: Option<io::Error>,
}

impl<O: Write, E: Write> SpliceHandler<O, E> {
    pub fn new(stdout: O, stderr: E) -> Self {
        Self {
            stdout,
            stderr,
            buf: vec![0; CHUNK],
            forwarded: [0; 2],
            failure: None,
        }
    }

    /// Bytes forwarded so far as `(stdout, stderr)`.
    pub fn forwarded(&self) -> (u64, u64) {
        (self.forwarded[0], self.forwarded[1])
    }

    /// Flush both writers and surface the first forwarding failure.
    pub fn finish(mut self) -> io::Result<(O, E)> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        self.stdout.flush()?;
        self.stderr.flush()?;
        Ok((self.stdout, self.stderr))
    }

    fn forward(&mut self, fd: BorrowedFd<'_>, source: Source) -> io::Result<()> {
        let n = match read_fd(fd, &mut self.buf) {
            Ok(n) => n,
            Err(Errno::EAGAIN) => return Ok(()),
            Err(errno) => return Err(errno.into()),
        };
        if n == 0 {
            trace!(%source, "end of stream");
            return Ok(());
        }

        let slot = usize::from(source == Source::Stderr);
        let out: &mut dyn Write = if slot == 1 {
            &mut self.stderr
        } else {
            &mut self.stdout
        };
        out.write_all(&self.buf[..n])?;
        out.flush()?;
        self.forwarded[slot] += n as u64;
        Ok(())
    }
}

impl<O: Write, E: Write> RunHandler for SpliceHandler<O, E> {
    fn step(&mut self) -> Step {
        if self.failure.is_some() {
            return Step::quit();
        }
        Step::watch(
            SourceSet::empty()
                .with(Source::Stdout)
                .with(Source::Stderr),
        )
    }

    fn handle(&mut self, fd: Option<BorrowedFd<'_>>, source: Source) {
        match (source, fd) {
            (Source::Stdout | Source::Stderr, Some(fd)) => {
                if let Err(err) = self.forward(fd, source) {
                    warn!(%source, error = %err, "forwarding child output failed");
                    self.failure = Some(err);
                }
            }
            (Source::Timeout, _) => debug!("deadline reached while splicing"),
            (Source::Exit, _) => {
                let (out, err) = self.forwarded();
                debug!(stdout_bytes = out, stderr_bytes = err, "child exited");
            }
            _ => {}
        }
    }
}
