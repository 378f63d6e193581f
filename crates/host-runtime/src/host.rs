//! The bundle of services scripts run against.
//!
//! One [`Host`] is built by the process wiring and shared by reference
//! with the interpreter on both threads. It owns every piece of state the
//! board emulation needs: clock, pins, storage, output routing, and the
//! process terminator.

use crate::output::OutputRouter;
use crate::storage::Storage;
use crate::stubs::{PinBank, SerialStub};
use host_common::config::HostConfig;
use host_common::time::MonotonicClock;
use static_assertions::assert_impl_all;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Ends the process on behalf of the `exit` extension.
pub trait Terminator: Send + Sync + std::fmt::Debug {
    /// Terminate with `code`. Implementations that return let the caller continue.
    fn terminate(&self, code: i32);
}

/// Flushes stdout and exits the process.
#[derive(Debug, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        info!(code, "Exit requested");
        let _ = std::io::stdout().flush();
        std::process::exit(code);
    }
}

/// Emulated board services shared by the foreground and background threads.
#[derive(Debug)]
pub struct Host {
    /// Millisecond clock.
    pub clock: MonotonicClock,
    /// Digital pin bank.
    pub pins: PinBank,
    /// Emulated non-volatile storage.
    pub storage: Storage,
    /// Character output routing.
    pub output: OutputRouter,
    /// Serial port stubs.
    pub serial: SerialStub,
    /// File written by `save()` without arguments.
    pub default_save_file: PathBuf,
    terminator: Box<dyn Terminator>,
}

assert_impl_all!(Host: Send, Sync);

impl Host {
    /// Build the services described by `config`, printing to stdout and
    /// exiting the real process on `exit`.
    #[must_use]
    pub fn from_config(config: &HostConfig) -> Self {
        HostBuilder::new(config).build()
    }

    /// Request process termination.
    pub fn terminate(&self, code: i32) {
        self.terminator.terminate(code);
    }
}

/// Builder for [`Host`], used to swap the console sink and terminator.
pub struct HostBuilder {
    config: HostConfig,
    console: Option<Box<dyn Write + Send>>,
    terminator: Option<Box<dyn Terminator>>,
}

impl HostBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: &HostConfig) -> Self {
        Self {
            config: config.clone(),
            console: None,
            terminator: None,
        }
    }

    /// Send console output to `sink` instead of stdout.
    #[must_use]
    pub fn console(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.console = Some(sink);
        self
    }

    /// Replace the process terminator.
    #[must_use]
    pub fn terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Build the host.
    #[must_use]
    pub fn build(self) -> Host {
        let output = match self.console {
            Some(sink) => OutputRouter::with_console(sink),
            None => OutputRouter::stdout(),
        };
        Host {
            clock: MonotonicClock::new(self.config.clock.source),
            pins: PinBank::new(self.config.pins.count),
            storage: Storage::new(self.config.storage.size),
            output,
            serial: SerialStub,
            default_save_file: self.config.save.default_file,
            terminator: self
                .terminator
                .unwrap_or_else(|| Box::new(ProcessTerminator)),
        }
    }
}
