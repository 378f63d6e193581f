//! Background scheduler acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Background tasks fire at their configured cadence on the real thread
//! - A task runner stuck at zero deadlines is throttled, not spun on
//! - A task started during a long sleep runs within one idle interval
//! - Foreground commands and background runs never overlap

use super::common::{wait_for, Rig};
use host_common::config::{HostConfig, SchedulerConfig};
use host_runtime::foreground::ForegroundLoop;
use host_runtime::interpreter::{Deadline, Interpreter};
use host_runtime::lock::ExecutionLock;
use host_runtime::scheduler::BackgroundScheduler;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_task_fires_at_interval() {
    let rig = Rig::new(HostConfig::default());
    let lock = ExecutionLock::new(rig.console());
    let scheduler = BackgroundScheduler::new(lock.clone(), &rig.config.scheduler)
        .spawn()
        .unwrap();

    lock.with(|c| c.do_command("function tick {print \"t\"}; run tick, 50"));
    thread::sleep(Duration::from_millis(450));
    lock.with(|c| c.do_command("stop"));

    // The thread may sit out one idle interval before seeing the task.
    let ticks = rig.output.count_lines("t");
    assert!((3..=10).contains(&ticks), "ticks = {ticks}");
    assert!(scheduler.stats().slept_ms() > 0);
    assert_eq!(scheduler.thread_name(), Some("background"));
}

#[test]
fn test_new_task_not_delayed_by_long_pending_task() {
    let rig = Rig::new(HostConfig::default());
    let lock = ExecutionLock::new(rig.console());
    let _scheduler = BackgroundScheduler::new(lock.clone(), &rig.config.scheduler)
        .spawn()
        .unwrap();

    lock.with(|c| {
        c.do_command("function slow {print \"s\"}; function fast {print \"f\"}; run slow, 3000")
    });
    assert!(wait_for(Duration::from_secs(2), || rig.output.count_lines("s") >= 1));
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    lock.with(|c| c.do_command("run fast, 10"));
    assert!(wait_for(Duration::from_secs(5), || rig.output.count_lines("f") >= 1));

    let waited = started.elapsed();
    let limit = rig.config.console.idle_interval + Duration::from_millis(400);
    assert!(waited < limit, "first run after {waited:?}");
    assert_eq!(rig.output.count_lines("s"), 1);
}

#[test]
fn test_zero_deadline_task_is_throttled() {
    let mut config = HostConfig::default();
    config.scheduler = SchedulerConfig {
        thread_name: "spin-check".to_string(),
        max_immediate_reruns: 4,
        zero_deadline_backoff: Duration::from_millis(10),
    };
    let rig = Rig::new(config);
    let lock = ExecutionLock::new(rig.console());
    lock.with(|c| c.do_command("function spin {1}; run spin"));

    let scheduler = BackgroundScheduler::new(lock.clone(), &rig.config.scheduler)
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_millis(250));

    let stats = scheduler.stats();
    assert!(stats.backoffs() >= 5, "backoffs = {}", stats.backoffs());
    // Four runs per back-off, one back-off per 10ms.
    assert!(
        stats.iterations() < 1_000,
        "iterations = {}",
        stats.iterations()
    );
    assert!(scheduler.is_running());
}

/// Interpreter that detects overlapping entry from two threads.
struct OverlapDetector {
    inside: Arc<AtomicBool>,
    overlaps: Arc<AtomicU64>,
    background_runs: Arc<AtomicU64>,
}

impl OverlapDetector {
    fn enter(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(200));
        self.inside.store(false, Ordering::SeqCst);
    }
}

impl Interpreter for OverlapDetector {
    fn run_background_tasks(&mut self) -> Deadline {
        self.enter();
        self.background_runs.fetch_add(1, Ordering::SeqCst);
        Deadline::from_millis(1)
    }

    fn do_command(&mut self, _line: &str) {
        self.enter();
    }
}

#[test]
fn test_foreground_and_background_never_overlap() {
    let overlaps = Arc::new(AtomicU64::new(0));
    let background_runs = Arc::new(AtomicU64::new(0));
    let lock = ExecutionLock::new(OverlapDetector {
        inside: Arc::new(AtomicBool::new(false)),
        overlaps: Arc::clone(&overlaps),
        background_runs: Arc::clone(&background_runs),
    });

    let _scheduler = BackgroundScheduler::new(lock.clone(), &SchedulerConfig::default())
        .spawn()
        .unwrap();

    let input = "cmd\n".repeat(500);
    let summary = ForegroundLoop::new(Cursor::new(input), lock, 256).run();
    assert_eq!(summary.lines_dispatched, 500);

    assert!(wait_for(Duration::from_secs(2), || {
        background_runs.load(Ordering::SeqCst) >= 10
    }));
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}
