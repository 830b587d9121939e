// src/process/mod.rs

//! Supervision of a single child process.
//!
//! - [`Supervisor`] owns the child's pipes and lifecycle
//!   (`init` → `spawn` → `run` → `destroy`).
//! - [`Supervisor::run`] is a single-threaded epoll reactor driven by a
//!   caller-supplied [`RunHandler`].
//! - [`Supervisor::terminate`] escalates SIGTERM → SIGKILL within the
//!   configured grace window.

mod error;
mod notify;
pub mod pipe;
mod reap;
mod run_loop;
pub mod sigchld;
mod source;
mod supervisor;
mod terminate;

pub use error::{Result, SupervisorError};
pub use pipe::{read_fd, write_fd, Pipe};
pub use reap::ResourceUsage;
pub use run_loop::{RunHandler, Step};
pub use sigchld::SigchldBlock;
pub use source::{Source, SourceSet};
pub use supervisor::Supervisor;
