//! Emulated non-volatile storage.
//!
//! A fixed-size byte array created once at startup. Erased bytes read as
//! [`ERASED_BYTE`], matching a freshly erased EEPROM.

use host_common::error::{HostError, HostResult};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Value of every byte that has never been written (or was erased).
pub const ERASED_BYTE: u8 = 0xFF;

/// Fixed-size addressable byte store with bounds-checked access.
#[derive(Debug)]
pub struct Storage {
    bytes: Mutex<Box<[u8]>>,
}

impl Storage {
    /// Create a store of `size` erased bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        debug!(size, "Creating emulated storage");
        Self {
            bytes: Mutex::new(vec![ERASED_BYTE; size].into_boxed_slice()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        // A panic mid-write leaves plain bytes behind; keep using them.
        self.bytes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store has zero capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AddressOutOfRange`] past the end of the store.
    pub fn read(&self, address: usize) -> HostResult<u8> {
        let bytes = self.lock();
        bytes
            .get(address)
            .copied()
            .ok_or(HostError::AddressOutOfRange {
                address,
                size: bytes.len(),
            })
    }

    /// Write one byte.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AddressOutOfRange`] past the end of the store.
    pub fn write(&self, address: usize, value: u8) -> HostResult<()> {
        let mut bytes = self.lock();
        let size = bytes.len();
        match bytes.get_mut(address) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(HostError::AddressOutOfRange { address, size }),
        }
    }

    /// Reset every byte to [`ERASED_BYTE`].
    pub fn erase(&self) {
        self.lock().fill(ERASED_BYTE);
    }

    /// Copy of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().to_vec()
    }

    /// Run `f` with exclusive access to all bytes, for multi-byte edits
    /// that must not interleave with other writers.
    pub fn update<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.lock();
        f(&mut bytes)
    }
}
