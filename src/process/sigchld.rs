// src/process/sigchld.rs

//! Scoped blocking of `SIGCHLD` for the calling thread.
//!
//! While a child is supervised, `SIGCHLD` must stay blocked so the
//! "child exited" fact is only observed through a `signalfd` and never
//! consumed by default delivery. Scopes nest per thread: the first
//! [`SigchldBlock`] blocks the signal and records whether it was already
//! blocked, the last one dropped restores that state.

use std::cell::Cell;
use std::marker::PhantomData;

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use tracing::{trace, warn};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static WAS_BLOCKED: Cell<bool> = const { Cell::new(false) };
}

/// The mask containing only `SIGCHLD`.
pub fn sigchld_mask() -> SigSet {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    mask
}

/// Guard keeping `SIGCHLD` blocked on this thread while alive.
///
/// Not `Send`: the mask it manages belongs to the thread that created it.
#[derive(Debug)]
pub struct SigchldBlock {
    _thread_bound: PhantomData<*const ()>,
}

impl SigchldBlock {
    pub fn acquire() -> nix::Result<Self> {
        if DEPTH.get() == 0 {
            let mut old = SigSet::empty();
            pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&sigchld_mask()), Some(&mut old))?;
            WAS_BLOCKED.set(old.contains(Signal::SIGCHLD));
            trace!(was_blocked = WAS_BLOCKED.get(), "SIGCHLD blocked");
        }
        DEPTH.set(DEPTH.get() + 1);

        Ok(Self {
            _thread_bound: PhantomData,
        })
    }

    /// Number of live scopes on the current thread.
    pub fn depth() -> usize {
        DEPTH.get()
    }

    /// Whether `SIGCHLD` was already blocked before the outermost scope.
    ///
    /// Also read by a forked child to hand its program the original mask.
    pub fn was_blocked() -> bool {
        WAS_BLOCKED.get()
    }
}

impl Drop for SigchldBlock {
    fn drop(&mut self) {
        let depth = DEPTH.get().saturating_sub(1);
        DEPTH.set(depth);

        if depth > 0 || WAS_BLOCKED.get() {
            return;
        }

        match pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&sigchld_mask()), None) {
            Ok(()) => trace!("SIGCHLD unblocked"),
            Err(err) => warn!(error = %err, "failed to restore SIGCHLD mask"),
        }
    }
}
