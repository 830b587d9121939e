//! A [`RunHandler`] that records everything the run loop hands it.

use std::os::fd::BorrowedFd;

use runtest::process::{read_fd, write_fd, RunHandler, Source, SourceSet, Step};

/// Captures child output and the order sources were dispatched in.
///
/// Optionally feeds `input` to the child's stdin (closing it once everything
/// is written) and can ask the loop to quit after a number of steps.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Every dispatched source, in order.
    pub dispatched: Vec<Source>,
    /// Interest returned by each `step` call.
    pub steps: Vec<SourceSet>,
    input: Option<Vec<u8>>,
    written: usize,
    quit_after: Option<usize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `input` to the child's stdin, then close it.
    pub fn with_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Request a quit on the `n`-th call to `step`.
    pub fn quit_after(mut self, n: usize) -> Self {
        self.quit_after = Some(n);
        self
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn saw(&self, source: Source) -> bool {
        self.dispatched.contains(&source)
    }

    fn input_pending(&self) -> bool {
        self.input
            .as_ref()
            .is_some_and(|input| self.written < input.len())
    }
}

impl RunHandler for RecordingHandler {
    fn step(&mut self) -> Step {
        if self.quit_after.is_some_and(|n| self.steps.len() + 1 >= n) {
            self.steps.push(SourceSet::empty());
            return Step::quit();
        }

        let mut interest = SourceSet::empty()
            .with(Source::Stdout)
            .with(Source::Stderr);
        let mut step_close = false;
        if self.input_pending() {
            interest.insert(Source::Stdin);
        } else if self.input.take().is_some() {
            step_close = true;
        }
        self.steps.push(interest);

        let step = Step::watch(interest);
        if step_close { step.and_close_stdin() } else { step }
    }

    fn handle(&mut self, fd: Option<BorrowedFd<'_>>, source: Source) {
        self.dispatched.push(source);
        let Some(fd) = fd else {
            return;
        };

        match source {
            Source::Stdout | Source::Stderr => {
                let mut buf = [0u8; 4096];
                if let Ok(n) = read_fd(fd, &mut buf) {
                    let sink = if source == Source::Stdout {
                        &mut self.stdout
                    } else {
                        &mut self.stderr
                    };
                    sink.extend_from_slice(&buf[..n]);
                }
            }
            Source::Stdin => {
                if let Some(input) = &self.input {
                    if let Ok(n) = write_fd(fd, &input[self.written..]) {
                        self.written += n;
                    }
                }
            }
            _ => {}
        }
    }
}
