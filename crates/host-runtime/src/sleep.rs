//! Blocking sleeps for the background scheduler.
//!
//! A sleep may be cut short by a signal. [`sleep_until_elapsed`] resumes
//! with the time the OS reports as remaining, so an interruption never
//! wakes the scheduler early.

use std::time::Duration;
use tracing::{trace, warn};

/// How a single sleep call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full duration elapsed.
    Completed,
    /// A signal interrupted the sleep with `remaining` still to go.
    Interrupted {
        /// Unslept part of the request.
        remaining: Duration,
    },
}

/// A blocking sleep primitive.
pub trait Sleeper: Send {
    /// Sleep for `duration`, or until interrupted.
    fn sleep(&mut self, duration: Duration) -> SleepOutcome;
}

/// `nanosleep` on Unix, `std::thread::sleep` elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NanoSleeper;

impl Sleeper for NanoSleeper {
    #[cfg(unix)]
    fn sleep(&mut self, duration: Duration) -> SleepOutcome {
        let request = libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut remaining = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // SAFETY: both pointers refer to live, properly aligned timespecs.
        let result = unsafe { libc::nanosleep(&request, &mut remaining) };
        if result == 0 {
            return SleepOutcome::Completed;
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            let remaining = Duration::new(
                u64::try_from(remaining.tv_sec).unwrap_or(0),
                u32::try_from(remaining.tv_nsec).unwrap_or(0),
            );
            return SleepOutcome::Interrupted { remaining };
        }

        warn!(error = %err, "nanosleep failed, falling back to thread::sleep");
        std::thread::sleep(duration);
        SleepOutcome::Completed
    }

    #[cfg(not(unix))]
    fn sleep(&mut self, duration: Duration) -> SleepOutcome {
        std::thread::sleep(duration);
        SleepOutcome::Completed
    }
}

/// Sleep the whole of `duration`, resuming after every interruption with
/// the remaining time. Returns the number of interruptions absorbed.
pub fn sleep_until_elapsed(sleeper: &mut dyn Sleeper, duration: Duration) -> u32 {
    let mut remaining = duration;
    let mut interruptions = 0;
    while !remaining.is_zero() {
        match sleeper.sleep(remaining) {
            SleepOutcome::Completed => break,
            SleepOutcome::Interrupted { remaining: left } => {
                interruptions += 1;
                trace!(remaining_us = left.as_micros(), "Sleep interrupted, resuming");
                remaining = left;
            }
        }
    }
    interruptions
}
