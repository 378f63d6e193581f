//! Emulated board I/O for running scripts without hardware.
//!
//! Digital pins are a single bitmask shared by the foreground and
//! background threads. Analog, pulse, and serial calls are fixed stubs.

use crossbeam_utils::CachePadded;
use host_common::error::{HostError, HostResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Largest pin bank the bitmask can hold.
pub const MAX_PINS: u32 = 64;

/// Value returned by every analog and pulse stub.
pub const STUB_SENTINEL: i32 = 0;

/// Character returned by the serial read stub.
pub const SERIAL_STUB_CHAR: u8 = b'$';

/// Emulated digital pin bank.
///
/// Each pin is one bit of the mask: written by [`digital_write`](Self::digital_write),
/// read back by [`digital_read`](Self::digital_read).
#[derive(Debug)]
pub struct PinBank {
    mask: CachePadded<AtomicU64>,
    count: u32,
}

impl Default for PinBank {
    fn default() -> Self {
        Self::new(MAX_PINS)
    }
}

impl PinBank {
    /// Create a bank of `count` pins, all low. `count` is capped at [`MAX_PINS`].
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            mask: CachePadded::new(AtomicU64::new(0)),
            count: count.min(MAX_PINS),
        }
    }

    /// Number of pins in the bank.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    fn check(&self, pin: u32) -> HostResult<u64> {
        if pin < self.count {
            Ok(1u64 << pin)
        } else {
            Err(HostError::PinOutOfRange {
                pin,
                count: self.count,
            })
        }
    }

    /// Configure a pin direction. Accepted and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::PinOutOfRange`] for pins outside the bank.
    pub fn pin_mode(&self, pin: u32, mode: u8) -> HostResult<()> {
        self.check(pin)?;
        trace!(pin, mode, "pinMode");
        Ok(())
    }

    /// Set or clear one pin.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::PinOutOfRange`] for pins outside the bank.
    pub fn digital_write(&self, pin: u32, value: bool) -> HostResult<()> {
        let bit = self.check(pin)?;
        if value {
            self.mask.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.mask.fetch_and(!bit, Ordering::AcqRel);
        }
        trace!(pin, value, "digitalWrite");
        Ok(())
    }

    /// Read back the last value written to a pin.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::PinOutOfRange`] for pins outside the bank.
    pub fn digital_read(&self, pin: u32) -> HostResult<bool> {
        let bit = self.check(pin)?;
        Ok(self.mask.load(Ordering::Acquire) & bit != 0)
    }

    /// The whole mask, bit `n` being pin `n`.
    #[must_use]
    pub fn snapshot(&self) -> u64 {
        self.mask.load(Ordering::Acquire)
    }

    /// Analog read stub.
    #[must_use]
    pub fn analog_read(&self, _pin: u32) -> i32 {
        STUB_SENTINEL
    }

    /// Analog write stub.
    pub fn analog_write(&self, pin: u32, value: i32) {
        trace!(pin, value, "analogWrite ignored");
    }

    /// Pulse measurement stub.
    #[must_use]
    pub fn pulse_in(&self, _pin: u32, _level: i32, _timeout: i32) -> i32 {
        STUB_SENTINEL
    }
}

/// Serial port stubs; console input arrives line-wise on stdin instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialStub;

impl SerialStub {
    /// Bytes waiting on the emulated serial port. Always zero.
    #[must_use]
    pub fn available(self) -> i32 {
        0
    }

    /// Read one byte from the emulated serial port.
    #[must_use]
    pub fn read(self) -> u8 {
        SERIAL_STUB_CHAR
    }

    /// Change the baud rate of a serial pin. Accepted and ignored.
    #[must_use]
    pub fn set_baud(self, _pin: i32, _baud: u32) -> i32 {
        0
    }
}
