//! Foreground command loop.
//!
//! Reads command lines (stdin in the daemon) and hands each one to the
//! interpreter under the execution lock. End of input is a normal stop.

use crate::interpreter::Interpreter;
use crate::lock::ExecutionLock;
use std::io::{self, BufRead, Read};
use tracing::{debug, info, warn};

/// Why the foreground loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// The input reached end of file.
    EndOfInput,
    /// Reading the input failed.
    ReadError,
}

/// Result of a foreground loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Lines handed to the interpreter.
    pub lines_dispatched: u64,
    /// Why the loop stopped.
    pub ended_by: LoopEnd,
}

/// Reusable line buffer owned by the foreground loop.
#[derive(Debug)]
pub struct CommandBuffer {
    bytes: Vec<u8>,
    max_len: usize,
    /// Bytes of the current line skipped past the buffer limit.
    dropped: usize,
}

impl CommandBuffer {
    /// Buffer accepting lines of at most `max_len` bytes.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(max_len + 2),
            max_len,
            dropped: 0,
        }
    }

    /// Read the next line into the buffer. `Ok(false)` at end of input.
    ///
    /// At most `max_len` bytes plus a CR LF terminator are stored; the rest
    /// of an overlong line is read and thrown away.
    ///
    /// # Errors
    ///
    /// Propagates read errors from `reader`.
    pub fn fill(&mut self, reader: &mut dyn BufRead) -> io::Result<bool> {
        self.bytes.clear();
        self.dropped = 0;
        let limit = self.max_len as u64 + 2;
        let read = Read::take(&mut *reader, limit).read_until(b'\n', &mut self.bytes)?;
        if read as u64 == limit && self.bytes.last() != Some(&b'\n') {
            self.dropped = skip_line(reader)?;
        }
        Ok(read > 0)
    }

    /// The buffered line without its terminator, truncated to the
    /// maximum length. Invalid UTF-8 is replaced.
    #[must_use]
    pub fn line(&self) -> String {
        let mut end = self.bytes.len();
        while end > 0 && matches!(self.bytes[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        if end > self.max_len {
            warn!(
                length = end,
                dropped = self.dropped,
                max = self.max_len,
                "Command line truncated"
            );
            end = self.max_len;
        }
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }

    /// Empty the buffer for the next line.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.dropped = 0;
    }
}

/// Consume input up to and including the next newline. Returns the byte count.
fn skip_line(reader: &mut dyn BufRead) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(skipped);
        }
        let (used, found) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        skipped += used;
        if found {
            return Ok(skipped);
        }
    }
}

/// Reads lines from `reader` and dispatches them to the interpreter.
pub struct ForegroundLoop<R, I> {
    reader: R,
    buffer: CommandBuffer,
    lock: ExecutionLock<I>,
}

impl<R: BufRead, I: Interpreter> ForegroundLoop<R, I> {
    /// Loop over `reader` dispatching into the interpreter behind `lock`.
    pub fn new(reader: R, lock: ExecutionLock<I>, max_line_len: usize) -> Self {
        Self {
            reader,
            buffer: CommandBuffer::new(max_line_len),
            lock,
        }
    }

    /// Dispatch lines until the input ends or fails.
    pub fn run(&mut self) -> LoopSummary {
        let mut lines_dispatched = 0;
        let ended_by = loop {
            match self.buffer.fill(&mut self.reader) {
                Ok(true) => {}
                Ok(false) => break LoopEnd::EndOfInput,
                Err(e) => {
                    warn!(error = %e, "Reading command input failed");
                    break LoopEnd::ReadError;
                }
            }

            let line = self.buffer.line();
            self.buffer.reset();
            if line.trim().is_empty() {
                continue;
            }

            debug!(line = %line, "Dispatching command");
            self.lock.with(|interpreter| interpreter.do_command(&line));
            lines_dispatched += 1;
        };

        info!(lines_dispatched, ?ended_by, "Foreground loop finished");
        LoopSummary {
            lines_dispatched,
            ended_by,
        }
    }
}
