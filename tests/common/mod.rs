#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use runtest::config::SupervisorConfig;

pub use runtest_test_utils::{init_tracing, sh, RecordingHandler};

static SERIAL: Mutex<()> = Mutex::new(());

/// Tests in one binary that count open descriptors must not overlap.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generous deadline, short grace window.
pub fn quick_config() -> SupervisorConfig {
    SupervisorConfig::default()
        .timeout(Duration::from_secs(10))
        .grace(Duration::from_millis(500))
}
