//! Interrupted-sleep acceptance test with a real signal.
//!
//! # Acceptance Criteria
//!
//! - A signal landing while the scheduler sleeps does not run tasks early
//! - The sleep resumes and the interruption is counted

use super::common::wait_for;
use host_common::config::SchedulerConfig;
use host_runtime::interpreter::{Deadline, Interpreter};
use host_runtime::lock::ExecutionLock;
use host_runtime::scheduler::BackgroundScheduler;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

extern "C" fn ignore_signal(_: libc::c_int) {}

/// Records when it runs and which thread runs it.
struct SlowTicker {
    runs: Arc<Mutex<Vec<Instant>>>,
    thread_id: Arc<AtomicUsize>,
}

impl Interpreter for SlowTicker {
    fn run_background_tasks(&mut self) -> Deadline {
        // SAFETY: pthread_self has no preconditions.
        let me = unsafe { libc::pthread_self() };
        self.thread_id.store(me as usize, Ordering::SeqCst);
        self.runs.lock().unwrap().push(Instant::now());
        Deadline::from_millis(300)
    }

    fn do_command(&mut self, _line: &str) {}
}

#[test]
fn test_signal_does_not_wake_scheduler_early() {
    // No SA_RESTART, so nanosleep returns EINTR.
    let action = SigAction::new(
        SigHandler::Handler(ignore_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler does nothing.
    unsafe { sigaction(Signal::SIGUSR1, &action) }.unwrap();

    let runs = Arc::new(Mutex::new(Vec::new()));
    let thread_id = Arc::new(AtomicUsize::new(0));
    let lock = ExecutionLock::new(SlowTicker {
        runs: Arc::clone(&runs),
        thread_id: Arc::clone(&thread_id),
    });
    let scheduler = BackgroundScheduler::new(lock, &SchedulerConfig::default())
        .spawn()
        .unwrap();

    assert!(wait_for(Duration::from_secs(2), || !runs.lock().unwrap().is_empty()));
    thread::sleep(Duration::from_millis(100));

    let target = thread_id.load(Ordering::SeqCst) as libc::pthread_t;
    for _ in 0..3 {
        // SAFETY: the scheduler thread never exits while the test runs.
        let rc = unsafe { libc::pthread_kill(target, libc::SIGUSR1) };
        assert_eq!(rc, 0);
        thread::sleep(Duration::from_millis(20));
    }

    assert!(wait_for(Duration::from_secs(2), || runs.lock().unwrap().len() >= 2));
    let runs = runs.lock().unwrap();
    let gap = runs[1] - runs[0];
    assert!(gap >= Duration::from_millis(290), "woke after {gap:?}");
    assert!(scheduler.stats().interrupted_sleeps() >= 1);
}
