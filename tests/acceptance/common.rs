//! Common utilities for integration tests.

#![allow(dead_code)] // Not every test module uses every helper

use host_common::config::HostConfig;
use host_console::Console;
use host_runtime::{FunctionTable, Host, HostBuilder, Terminator};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Console sink whose contents the test can read back.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    /// Everything written so far.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Number of lines equal to `line`.
    pub fn count_lines(&self, line: &str) -> usize {
        self.text().split("\r\n").filter(|l| *l == line).count()
    }
}

/// Terminator that records exit codes instead of exiting.
#[derive(Debug, Clone, Default)]
pub struct RecordedExits(Arc<Mutex<Vec<i32>>>);

impl Terminator for RecordedExits {
    fn terminate(&self, code: i32) {
        self.0.lock().unwrap().push(code);
    }
}

impl RecordedExits {
    pub fn codes(&self) -> Vec<i32> {
        self.0.lock().unwrap().clone()
    }
}

/// Host with captured output and recorded exits.
pub struct Rig {
    pub config: HostConfig,
    pub host: Arc<Host>,
    pub output: Capture,
    pub exits: RecordedExits,
}

impl Rig {
    pub fn new(config: HostConfig) -> Self {
        let output = Capture::default();
        let exits = RecordedExits::default();
        let host = HostBuilder::new(&config)
            .console(Box::new(output.clone()))
            .terminator(Box::new(exits.clone()))
            .build();
        Self {
            config,
            host: Arc::new(host),
            output,
            exits,
        }
    }

    /// A console interpreter over this rig's host.
    pub fn console(&self) -> Console {
        Console::new(
            Arc::clone(&self.host),
            FunctionTable::standard(),
            &self.config.console,
        )
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
