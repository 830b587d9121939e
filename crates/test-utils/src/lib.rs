pub mod recorder;

use std::ffi::OsString;
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub use recorder::RecordingHandler;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Argument vector running `script` through `/bin/sh -c`.
///
/// Fixtures are inline scripts rather than files on disk: exec'ing a file
/// another test thread still holds open for writing fails with `ETXTBSY`.
pub fn sh(script: &str) -> Vec<OsString> {
    ["/bin/sh", "-c", script].into_iter().map(OsString::from).collect()
}
