use thiserror::Error;

/// Host error types covering emulated hardware and service failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Emulated storage accessed outside its fixed size.
    #[error("storage address {address} out of range (size {size})")]
    AddressOutOfRange {
        /// Requested address.
        address: usize,
        /// Size of the storage in bytes.
        size: usize,
    },

    /// Digital pin index beyond the emulated pin bank.
    #[error("pin {pin} out of range (pin count {count})")]
    PinOutOfRange {
        /// Requested pin.
        pin: u32,
        /// Number of emulated pins.
        count: u32,
    },

    /// Emulated storage has no room left for the requested write.
    #[error("storage full: {needed} bytes needed, {available} available")]
    StorageFull {
        /// Bytes required.
        needed: usize,
        /// Bytes still free.
        available: usize,
    },

    /// A service thread could not be started.
    #[error("failed to spawn thread {name}: {reason}")]
    ThreadSpawn {
        /// Thread name.
        name: String,
        /// OS-level reason.
        reason: String,
    },
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenience type alias for host operations.
pub type HostResult<T> = Result<T, HostError>;
