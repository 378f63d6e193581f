//! End-to-end console sessions.
//!
//! # Acceptance Criteria
//!
//! - `save()` writes the listing to a file, returns 1, and restores output
//! - A saved file replayed into a fresh host restores the macros
//! - Pins, storage, and `exit` behave the same through the console

use super::common::Rig;
use host_common::config::HostConfig;
use host_runtime::foreground::ForegroundLoop;
use host_runtime::interpreter::Interpreter;
use host_runtime::lock::ExecutionLock;
use host_runtime::scheduler::BackgroundScheduler;
use std::io::{BufReader, Cursor};

fn run_session(rig: &Rig, script: &str) {
    let lock = ExecutionLock::new(rig.console());
    ForegroundLoop::new(Cursor::new(script.to_string()), lock, 256).run();
}

#[test]
fn test_save_then_print() {
    let rig = Rig::new(HostConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");

    run_session(
        &rig,
        &format!(
            "function blink {{digitalWrite(13, !digitalRead(13))}}\n\
             print save(\"{}\")\n\
             print \"after\"\n",
            path.display()
        ),
    );

    let saved = std::fs::read_to_string(&path).unwrap();
    assert_eq!(saved, "function blink {digitalWrite(13, !digitalRead(13))};\r\n");
    assert_eq!(rig.output.text(), "1\r\nafter\r\n");
    assert!(!rig.host.output.is_redirected());
}

#[test]
fn test_save_default_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HostConfig::default();
    config.save.default_file = dir.path().join("eeprom");
    let rig = Rig::new(config);

    run_session(&rig, "function a {print 7}\nprint save()\n");
    assert_eq!(rig.output.text(), "1\r\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("eeprom")).unwrap(),
        "function a {print 7};\r\n"
    );
}

#[test]
fn test_save_failure_returns_zero() {
    let rig = Rig::new(HostConfig::default());
    run_session(&rig, "print save(\"/nonexistent-dir/out.bin\")\nprint 2\n");
    assert_eq!(rig.output.text(), "0\r\n2\r\n");
}

#[test]
fn test_saved_file_restores_macros() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state");

    let first = Rig::new(HostConfig::default());
    run_session(
        &first,
        &format!(
            "function on {{digitalWrite(4, 1)}}\nfunction both {{on; print \"done\"}}\nsave(\"{}\")\n",
            path.display()
        ),
    );

    let second = Rig::new(HostConfig::default());
    let lock = ExecutionLock::new(second.console());
    let file = std::fs::File::open(&path).unwrap();
    let summary = ForegroundLoop::new(BufReader::new(file), lock.clone(), 256).run();
    assert_eq!(summary.lines_dispatched, 2);

    lock.with(|c| c.do_command("both"));
    assert_eq!(second.output.text(), "done\r\n");
    assert!(second.host.pins.digital_read(4).unwrap());
}

#[test]
fn test_pins_and_storage_through_console() {
    let rig = Rig::new(HostConfig::default());
    run_session(
        &rig,
        "digitalWrite(0, 1); digitalWrite(63, 1)\n\
         print digitalRead(0), digitalRead(1), digitalRead(63)\n\
         eewrite(4000, 42); print eeread(4000), eeread(4001)\n\
         print analogRead(2), pulseIn(2, 1, 100), setBaud(0, 9600)\n\
         eeread(4096)\n",
    );
    let text = rig.output.text();
    let lines: Vec<_> = text.split("\r\n").collect();
    assert_eq!(lines[0], "1 0 1");
    assert_eq!(lines[1], "42 255");
    assert_eq!(lines[2], "0 0 0");
    assert!(lines[3].starts_with("error: "), "{}", lines[3]);
    assert_eq!(rig.host.pins.snapshot(), 1 | (1 << 63));
}

#[test]
fn test_exit_reaches_terminator() {
    let rig = Rig::new(HostConfig::default());
    run_session(&rig, "exit(3)\nexit\n");
    assert_eq!(rig.exits.codes(), vec![3, 0]);
}

#[test]
fn test_exit_from_background_task() {
    let rig = Rig::new(HostConfig::default());
    let lock = ExecutionLock::new(rig.console());
    lock.with(|c| c.do_command("function quit {exit(9)}; run quit, 1000"));
    let scheduler = BackgroundScheduler::new(lock.clone(), &rig.config.scheduler)
        .spawn()
        .unwrap();

    assert!(super::common::wait_for(
        std::time::Duration::from_secs(2),
        || !rig.exits.codes().is_empty()
    ));
    assert_eq!(rig.exits.codes()[0], 9);
    assert!(scheduler.is_running());
}

#[cfg(unix)]
#[test]
fn test_system_runs_shell() {
    let rig = Rig::new(HostConfig::default());
    run_session(&rig, "print system(\"exit 5\"), system(\"true\")\n");
    assert_eq!(rig.output.text(), "5 0\r\n");
}
