// src/harness/pump.rs

//! Forwarding of the runner's stdin into an interactive child.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::thread::{self, JoinHandle};

use tracing::debug;

/// Copy our stdin into `dest` on a helper thread; `dest` closes at EOF.
///
/// Start it after the child is spawned so the thread inherits the blocked
/// `SIGCHLD` mask and never swallows the exit notification. A child that
/// exits first makes the copy fail with `EPIPE`, which ends the thread.
pub fn pump_stdin(dest: OwnedFd) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-pump".to_string())
        .spawn(move || {
            let mut dest = File::from(dest);
            match io::copy(&mut io::stdin().lock(), &mut dest) {
                Ok(bytes) => debug!(bytes, "stdin forwarded to child"),
                Err(err) => debug!(error = %err, "stdin forwarding stopped"),
            }
        })
}
