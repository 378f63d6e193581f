//! Integration tests for script host acceptance testing.
//!
//! - Background task timing and scheduler back-off
//! - Interrupted sleeps with real signals (Unix)
//! - `save()` output capture and full console sessions

mod common;
mod scheduler_test;
mod session_test;
#[cfg(unix)]
mod signal_test;
