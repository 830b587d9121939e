// src/harness/mod.rs

//! Test-runner glue around the supervisor: output splicing, stdin
//! forwarding and the pass/fail verdict.

pub mod pump;
pub mod splice;
pub mod verdict;

pub use pump::pump_stdin;
pub use splice::SpliceHandler;
pub use verdict::Verdict;
