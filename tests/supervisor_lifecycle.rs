// tests/supervisor_lifecycle.rs

mod common;

use std::fs;

use common::{init_tracing, quick_config, serial, sh, RecordingHandler};
use runtest::process::{SigchldBlock, Source, Supervisor, SupervisorError};

fn open_fds() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
fn init_then_destroy_releases_every_descriptor() {
    let _serial = serial();
    init_tracing();

    let before = open_fds();
    let mut sup = Supervisor::init(quick_config()).unwrap();
    // Three stdio pipes plus the control pipe.
    assert_eq!(open_fds(), before + 8);

    sup.destroy();
    assert_eq!(open_fds(), before);
}

#[test]
fn full_lifecycle_leaves_no_descriptors_behind() {
    let _serial = serial();
    init_tracing();

    let before = open_fds();
    {
        let mut sup = Supervisor::init(quick_config()).unwrap();
        sup.spawn(&sh("echo done")).unwrap();
        sup.run(&mut RecordingHandler::new(), None).unwrap();
    }
    assert_eq!(open_fds(), before);
    assert_eq!(SigchldBlock::depth(), 0);
}

#[test]
fn echo_round_trip() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&["printf", "%s", "hello world"]).unwrap();
    assert!(sup.pid().is_some());

    let mut rec = RecordingHandler::new();
    let status = sup.run(&mut rec, None).unwrap();

    assert_eq!(status.code(), Some(0));
    assert_eq!(rec.stdout_str(), "hello world");
    assert!(rec.stderr.is_empty());
    assert_eq!(rec.dispatched.last(), Some(&Source::Exit));
    assert!(!rec.saw(Source::Timeout));

    assert!(sup.pid().is_none(), "identity cleared after reap");
    assert_eq!(sup.exit_status(), Some(status));

    // Nothing left to reap, must not block.
    sup.destroy();
}

#[test]
fn missing_program_is_a_launch_failure() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    let err = sup
        .spawn(&["/nonexistent/runtest-no-such-program"])
        .unwrap_err();

    match &err {
        SupervisorError::Launch { code, detail } => {
            assert_eq!(code, "execvp");
            assert!(!detail.is_empty());
        }
        other => panic!("expected Launch, got {other:?}"),
    }
    assert!(err.is_launch_failure());
    assert!(sup.pid().is_none(), "failed child was reaped");
    assert_eq!(sup.exit_status().and_then(|s| s.code()), Some(1));

    sup.destroy();
}

#[test]
fn exit_code_and_stderr_are_reported() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("echo oops >&2; exit 3")).unwrap();

    let mut rec = RecordingHandler::new();
    let status = sup.run(&mut rec, None).unwrap();

    assert_eq!(status.code(), Some(3));
    assert_eq!(rec.stderr_str(), "oops\n");
    assert!(rec.stdout.is_empty());
    assert!(sup.rusage().is_some());
}

#[test]
fn output_is_drained_before_exit_is_reported() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("head -c 100000 /dev/zero")).unwrap();

    let mut rec = RecordingHandler::new();
    let status = sup.run(&mut rec, None).unwrap();

    assert!(status.success());
    assert_eq!(rec.stdout.len(), 100_000);

    let exit_at = rec
        .dispatched
        .iter()
        .position(|s| *s == Source::Exit)
        .unwrap();
    assert_eq!(exit_at, rec.dispatched.len() - 1, "exit is the last dispatch");
}

#[test]
fn second_spawn_is_refused() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&["true"]).unwrap();
    sup.run(&mut RecordingHandler::new(), None).unwrap();

    assert!(matches!(
        sup.spawn(&["true"]),
        Err(SupervisorError::AlreadySpawned)
    ));
}

#[test]
fn run_without_child_is_refused() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    assert!(matches!(
        sup.run(&mut RecordingHandler::new(), None),
        Err(SupervisorError::NotSpawned)
    ));
}

#[test]
fn cleanup_hook_runs_in_child_before_exec() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    let mut hook = || {
        let msg = b"hook:";
        // SAFETY: writing a static buffer to the wired stdout.
        unsafe {
            libc::write(libc::STDOUT_FILENO, msg.as_ptr().cast(), msg.len());
        }
    };
    sup.spawn_with(&["printf", "%s", "main"], Some(&mut hook))
        .unwrap();

    let mut rec = RecordingHandler::new();
    sup.run(&mut rec, None).unwrap();

    assert_eq!(rec.stdout_str(), "hook:main");
}

#[test]
fn interactive_child_reads_fed_input() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config().interactive(true)).unwrap();
    sup.spawn(&["cat"]).unwrap();

    let mut rec = RecordingHandler::new().with_input("ping\npong\n");
    let status = sup.run(&mut rec, None).unwrap();

    assert!(status.success());
    assert_eq!(rec.stdout_str(), "ping\npong\n");
    assert!(rec.saw(Source::Stdin));
    assert!(sup.stdin().is_none(), "stdin closed once input ran out");
}

#[test]
fn non_interactive_child_sees_empty_stdin() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("wc -c")).unwrap();
    assert!(sup.stdin().is_none());

    let mut rec = RecordingHandler::new();
    sup.run(&mut rec, None).unwrap();

    assert_eq!(rec.stdout_str().trim(), "0");
    assert!(!rec.saw(Source::Stdin));
}

#[test]
fn monitor_descriptor_is_dispatched_first() {
    let _serial = serial();
    init_tracing();

    let monitor = runtest::process::Pipe::create().unwrap();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("echo out")).unwrap();

    let mut rec = RecordingHandler::new();
    sup.run(&mut rec, monitor.write_end()).unwrap();

    // An empty pipe is writable right away: the forced first round sees it.
    assert_eq!(rec.dispatched.first(), Some(&Source::Monitor));
    assert_eq!(rec.stdout_str(), "out\n");
}

#[test]
fn child_starts_with_default_sigpipe() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("grep SigIgn /proc/self/status")).unwrap();

    let mut rec = RecordingHandler::new();
    sup.run(&mut rec, None).unwrap();

    let line = rec.stdout_str();
    let mask = line
        .trim()
        .strip_prefix("SigIgn:")
        .map(|hex| u64::from_str_radix(hex.trim(), 16).unwrap())
        .unwrap_or_else(|| panic!("unexpected status line {line:?}"));
    let sigpipe_bit = 1u64 << (libc::SIGPIPE - 1);
    assert_eq!(mask & sigpipe_bit, 0, "SIGPIPE ignored in child: {mask:#x}");
}

#[test]
fn broken_pipeline_dies_quietly() {
    let _serial = serial();
    init_tracing();

    let mut sup = Supervisor::init(quick_config()).unwrap();
    sup.spawn(&sh("yes | head -n1 >/dev/null; echo done")).unwrap();

    let mut rec = RecordingHandler::new();
    let status = sup.run(&mut rec, None).unwrap();

    assert!(status.success());
    assert_eq!(rec.stdout_str(), "done\n");
    assert_eq!(rec.stderr_str(), "");
}
