//! Millisecond clock measured from process start.
//!
//! Two platform time sources sit behind [`TimeSource`]:
//!
//! - [`FineGrainedSource`]: `clock_gettime(CLOCK_MONOTONIC)` on Unix,
//!   `Instant` elsewhere
//! - [`WallClockSource`]: wall-clock sampling at microsecond resolution
//!
//! The source is picked once from [`TimeSourceKind`] when the clock is
//! built; callers of [`MonotonicClock`] see the same semantics either way.

use crate::config::TimeSourceKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const NANOS_PER_SEC: u32 = 1_000_000_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// A raw sample from a time source, split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Timestamp {
    /// Whole seconds.
    pub secs: u64,
    /// Sub-second part, always below one second.
    pub nanos: u32,
}

impl Timestamp {
    /// The zero timestamp.
    pub const ZERO: Timestamp = Timestamp { secs: 0, nanos: 0 };

    /// Build a timestamp, carrying excess nanoseconds into seconds.
    #[must_use]
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs.saturating_add(u64::from(nanos / NANOS_PER_SEC)),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Difference `self - earlier`, borrowing a second when the
    /// nanosecond part underflows. Clamps to zero if `earlier` is later.
    #[must_use]
    pub fn saturating_sub(self, earlier: Timestamp) -> Timestamp {
        if self <= earlier {
            return Timestamp::ZERO;
        }
        if self.nanos < earlier.nanos {
            Timestamp {
                secs: self.secs - earlier.secs - 1,
                nanos: NANOS_PER_SEC + self.nanos - earlier.nanos,
            }
        } else {
            Timestamp {
                secs: self.secs - earlier.secs,
                nanos: self.nanos - earlier.nanos,
            }
        }
    }

    /// Whole milliseconds represented by this timestamp.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.secs
            .saturating_mul(1000)
            .saturating_add(u64::from(self.nanos / NANOS_PER_MILLI))
    }

    fn as_nanos(self) -> u64 {
        self.secs
            .saturating_mul(u64::from(NANOS_PER_SEC))
            .saturating_add(u64::from(self.nanos))
    }

    fn from_nanos(nanos: u64) -> Self {
        let per_sec = u64::from(NANOS_PER_SEC);
        Self {
            secs: nanos / per_sec,
            nanos: (nanos % per_sec) as u32,
        }
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
    }
}

/// A platform time source.
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Take one sample. Only differences between samples are meaningful.
    fn sample(&self) -> Timestamp;
}

/// Fine-grained monotonic source.
#[derive(Debug)]
pub struct FineGrainedSource {
    /// Last good sample in nanoseconds, returned if the OS call fails.
    #[cfg(unix)]
    last_ns: AtomicU64,
    #[cfg(not(unix))]
    origin: std::time::Instant,
}

impl Default for FineGrainedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FineGrainedSource {
    /// Create the source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            last_ns: AtomicU64::new(0),
            #[cfg(not(unix))]
            origin: std::time::Instant::now(),
        }
    }
}

impl TimeSource for FineGrainedSource {
    #[cfg(unix)]
    fn sample(&self) -> Timestamp {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => {
                let sample = Timestamp::new(
                    u64::try_from(ts.tv_sec()).unwrap_or(0),
                    u32::try_from(ts.tv_nsec()).unwrap_or(0),
                );
                self.last_ns.store(sample.as_nanos(), Ordering::Relaxed);
                sample
            }
            Err(e) => {
                warn!(error = %e, "clock_gettime failed, reusing last sample");
                Timestamp::from_nanos(self.last_ns.load(Ordering::Relaxed))
            }
        }
    }

    #[cfg(not(unix))]
    fn sample(&self) -> Timestamp {
        Timestamp::from(self.origin.elapsed())
    }
}

/// Coarse wall-clock source with microsecond resolution.
#[derive(Debug, Default)]
pub struct WallClockSource;

impl TimeSource for WallClockSource {
    fn sample(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since_epoch) => Timestamp::new(
                since_epoch.as_secs(),
                since_epoch.subsec_micros() * 1000,
            ),
            Err(_) => Timestamp::ZERO,
        }
    }
}

/// Build the time source named by `kind`.
#[must_use]
pub fn time_source(kind: TimeSourceKind) -> Box<dyn TimeSource> {
    match kind {
        TimeSourceKind::Monotonic => Box::new(FineGrainedSource::new()),
        TimeSourceKind::Wall => Box::new(WallClockSource),
    }
}

/// Milliseconds elapsed since the clock was initialized.
///
/// Readings never go backwards between [`reset`](Self::reset) calls, even
/// when the wall-clock source is stepped back by the system.
#[derive(Debug)]
pub struct MonotonicClock {
    source: Box<dyn TimeSource>,
    /// Reference timestamp captured at init.
    startup: RwLock<Timestamp>,
    /// Latest elapsed value handed out.
    latest_ms: AtomicU64,
}

impl MonotonicClock {
    /// Initialize a clock on the given source kind.
    #[must_use]
    pub fn new(kind: TimeSourceKind) -> Self {
        debug!(source = %kind, "Initializing millisecond clock");
        Self::with_source(time_source(kind))
    }

    /// Initialize a clock on an explicit source.
    #[must_use]
    pub fn with_source(source: Box<dyn TimeSource>) -> Self {
        let startup = source.sample();
        Self {
            source,
            startup: RwLock::new(startup),
            latest_ms: AtomicU64::new(0),
        }
    }

    /// Capture a new reference point; elapsed time restarts from zero.
    ///
    /// Waits for readings in flight, so none of them can publish a value
    /// measured against the old reference point.
    pub fn reset(&self) {
        let mut startup = self.startup.write().unwrap_or_else(PoisonError::into_inner);
        *startup = self.source.sample();
        self.latest_ms.store(0, Ordering::Release);
    }

    /// Milliseconds since init (or the last reset).
    pub fn elapsed_millis(&self) -> u64 {
        // Held until the reading is published; reset takes the write side.
        let startup = self.startup.read().unwrap_or_else(PoisonError::into_inner);
        let elapsed = self.source.sample().saturating_sub(*startup).as_millis();
        let previous = self.latest_ms.fetch_max(elapsed, Ordering::AcqRel);
        drop(startup);
        previous.max(elapsed)
    }

    /// Block the calling thread for at least `ms` milliseconds.
    pub fn delay(&self, ms: u64) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    /// Block the calling thread for at least `us` microseconds.
    pub fn delay_micros(&self, us: u64) {
        if us > 0 {
            std::thread::sleep(Duration::from_micros(us));
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(TimeSourceKind::default())
    }
}
