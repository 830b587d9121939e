// src/process/pipe.rs

//! Anonymous pipe whose two endpoints are owned independently.
//!
//! Each endpoint is an `Option<OwnedFd>`: handing an end to someone else
//! (or dropping it) takes it out of the pipe, so "close the end you don't
//! need" is an ownership move instead of a bookkeeping exercise. Closing an
//! end that is already gone is a no-op.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;

#[derive(Debug, Default)]
pub struct Pipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl Pipe {
    /// Allocate both endpoints, close-on-exec.
    ///
    /// On failure nothing is left open.
    pub fn create() -> nix::Result<Self> {
        let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
        Ok(Self {
            read: Some(read),
            write: Some(write),
        })
    }

    pub fn read_end(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(|fd| fd.as_fd())
    }

    pub fn write_end(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(|fd| fd.as_fd())
    }

    pub fn take_read(&mut self) -> Option<OwnedFd> {
        self.read.take()
    }

    pub fn take_write(&mut self) -> Option<OwnedFd> {
        self.write.take()
    }

    pub fn close_read(&mut self) {
        self.read = None;
    }

    pub fn close_write(&mut self) {
        self.write = None;
    }

    /// Close whichever endpoints are still open.
    pub fn close(&mut self) {
        self.close_read();
        self.close_write();
    }

    pub fn is_closed(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }

    /// Raw descriptor of an endpoint, `-1` when closed.
    ///
    /// Only for the forked child, which must not touch anything that
    /// allocates.
    pub(crate) fn raw_read(&self) -> i32 {
        self.read.as_ref().map_or(-1, |fd| fd.as_raw_fd())
    }

    pub(crate) fn raw_write(&self) -> i32 {
        self.write.as_ref().map_or(-1, |fd| fd.as_raw_fd())
    }
}

/// Single `read(2)` on a borrowed descriptor, retried on `EINTR`.
pub fn read_fd(fd: BorrowedFd<'_>, buf: &mut [u8]) -> nix::Result<usize> {
    loop {
        // SAFETY: `buf` is a valid, writable region of `buf.len()` bytes.
        let rc = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        match Errno::result(rc) {
            Ok(n) => return Ok(n as usize),
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Single `write(2)` on a borrowed descriptor, retried on `EINTR`.
pub fn write_fd(fd: BorrowedFd<'_>, buf: &[u8]) -> nix::Result<usize> {
    loop {
        // SAFETY: `buf` is a valid, readable region of `buf.len()` bytes.
        let rc = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        match Errno::result(rc) {
            Ok(n) => return Ok(n as usize),
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_cloexec(fd: BorrowedFd<'_>) -> bool {
        // SAFETY: F_GETFD on a live descriptor has no side effects.
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
        flags >= 0 && flags & libc::FD_CLOEXEC != 0
    }

    #[test]
    fn create_opens_both_ends_cloexec() {
        let pipe = Pipe::create().unwrap();
        let rd = pipe.read_end().expect("read end open");
        let wr = pipe.write_end().expect("write end open");

        assert!(is_cloexec(rd));
        assert!(is_cloexec(wr));
        assert_ne!(pipe.raw_read(), pipe.raw_write());
    }

    #[test]
    fn bytes_flow_from_write_to_read_end() {
        let pipe = Pipe::create().unwrap();

        let n = write_fd(pipe.write_end().unwrap(), b"ping").unwrap();
        assert_eq!(n, 4);

        let mut buf = [0u8; 16];
        let n = read_fd(pipe.read_end().unwrap(), &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn closing_write_end_yields_eof() {
        let mut pipe = Pipe::create().unwrap();
        pipe.close_write();

        let mut buf = [0u8; 4];
        assert_eq!(read_fd(pipe.read_end().unwrap(), &mut buf).unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut pipe = Pipe::create().unwrap();
        pipe.close_read();
        pipe.close();
        pipe.close();

        assert!(pipe.is_closed());
        assert_eq!(pipe.raw_read(), -1);
        assert_eq!(pipe.raw_write(), -1);
    }

    #[test]
    fn default_pipe_is_closed() {
        let mut pipe = Pipe::default();
        assert!(pipe.is_closed());
        pipe.close();
        assert!(pipe.read_end().is_none());
    }

    #[test]
    fn take_moves_ownership_out() {
        let mut pipe = Pipe::create().unwrap();
        let wr = pipe.take_write().unwrap();

        assert!(pipe.write_end().is_none());
        assert!(pipe.take_write().is_none());

        drop(wr);
        let mut buf = [0u8; 1];
        assert_eq!(read_fd(pipe.read_end().unwrap(), &mut buf).unwrap(), 0);
    }
}
