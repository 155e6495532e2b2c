#![cfg(unix)]

use std::time::{Duration, Instant};

use bridge_core::BridgeError;
use bridge_process::{LogStream, ProcessSupervisor, SupervisorOptions};

fn sh(script: &str, opts: SupervisorOptions) -> Result<ProcessSupervisor, BridgeError> {
    ProcessSupervisor::start_command("sh", &["-c".to_string(), script.to_string()], None, opts)
}

fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn immediate_exit_surfaces_output_verbatim() {
    let err = sh("echo booting; echo 'Error: could not find main class' >&2; exit 1",
                 SupervisorOptions::default()).unwrap_err();
    match err {
        BridgeError::ProcessStart { stdout, stderr, .. } => {
            assert_eq!(stdout, "booting");
            assert_eq!(stderr, "Error: could not find main class");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_executable_is_start_error() {
    let err = ProcessSupervisor::start_command("/definitely/not/here", &[], None, SupervisorOptions::default())
        .unwrap_err();
    assert!(matches!(err, BridgeError::ProcessStart { .. }));
}

#[test]
fn running_child_logs_are_captured_and_stop_terminates() {
    let sup = sh("echo ready; echo 'WARN slow'; exec sleep 30", SupervisorOptions::default()).unwrap();
    assert!(sup.is_running());
    assert!(sup.pid() > 0);

    wait_until(|| sup.recent_logs(10).len() >= 2);
    let logs = sup.recent_logs(10);
    assert_eq!(logs[0].text, "ready");
    assert_eq!(logs[0].stream, LogStream::Stdout);
    assert_eq!(logs[1].level, log::Level::Warn);

    let started = Instant::now();
    sup.stop(Duration::from_secs(5));
    assert!(!sup.is_running());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn child_ignoring_sigterm_is_killed_after_timeout() {
    let sup = sh("trap '' TERM; echo armed; while true; do sleep 1; done", SupervisorOptions::default()).unwrap();
    wait_until(|| !sup.recent_logs(1).is_empty());
    sup.stop(Duration::from_millis(300));
    assert!(!sup.is_running());
    // stop repetido no falla
    sup.stop(Duration::from_millis(10));
}

#[test]
fn env_overrides_and_log_file_tee() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs/child.log");
    let mut opts = SupervisorOptions::default();
    opts.env.insert("SAGABRIDGE_TEST_VALUE".into(), "forty-two".into());
    opts.log_file = Some(log_path.clone());

    let sup = sh("echo value=$SAGABRIDGE_TEST_VALUE; exec sleep 30", opts).unwrap();
    wait_until(|| !sup.recent_logs(1).is_empty());
    assert_eq!(sup.recent_logs(1)[0].text, "value=forty-two");
    sup.stop(Duration::from_secs(2));

    let teed = std::fs::read_to_string(&log_path).unwrap();
    assert!(teed.contains("[stdout]"));
    assert!(teed.contains("value=forty-two"));
}

#[test]
fn non_utf8_output_does_not_stop_the_reader() {
    let sup = sh("echo before; printf 'caf\\351\\n'; echo after; exec sleep 5", SupervisorOptions::default()).unwrap();
    wait_until(|| sup.recent_logs(10).iter().any(|l| l.text == "after"));
    let texts: Vec<String> = sup.recent_logs(10).into_iter().map(|l| l.text).collect();
    sup.stop(Duration::from_secs(2));

    assert_eq!(texts.len(), 3, "{texts:?}");
    assert_eq!(texts[0], "before");
    assert!(texts[1].starts_with("caf"));
    assert_eq!(texts[2], "after");
}
