//! Seam between the execution services and the script interpreter.
//!
//! The interpreter core is a collaborator: the background scheduler only
//! asks it to run due tasks, and the foreground loop only hands it
//! command lines.

use std::time::Duration;

/// Relative time until the task runner wants to be called again.
///
/// Recomputed on every scheduler iteration, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Deadline(u64);

impl Deadline {
    /// Run again immediately.
    pub const IMMEDIATE: Deadline = Deadline(0);

    /// Deadline `ms` milliseconds from now.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Deadline covering `duration`, rounded down to whole milliseconds.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Milliseconds until the next call.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The deadline as a sleep duration.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Whether the runner asked to be called again without sleeping.
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Entry points the host calls on the interpreter.
pub trait Interpreter: Send {
    /// Run every background task that is due and report when the next
    /// one will be.
    fn run_background_tasks(&mut self) -> Deadline;

    /// Execute one command line typed at the console.
    fn do_command(&mut self, line: &str);
}

/// The interpreter's state-listing routine, which `save()` captures.
pub trait StateListing {
    /// Print the interpreter state through the host output router.
    fn list_state(&self);
}
