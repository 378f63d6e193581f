//! Macro storage inside the emulated non-volatile memory.
//!
//! Entries are packed from address 0 as `NAME\0BODY\0`. The first
//! [`ERASED_BYTE`] where a name would start marks the end of the used
//! region. Removing an entry compacts the rest down and erases the tail.

use host_common::error::{HostError, HostResult};
use host_runtime::storage::{Storage, ERASED_BYTE};
use tracing::{debug, warn};

/// One stored macro and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroEntry {
    pub name: String,
    pub body: String,
    pub offset: usize,
    /// Encoded size including both terminators.
    pub len: usize,
}

/// Used and free bytes of the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: usize,
    pub free: usize,
}

fn scan(bytes: &[u8]) -> (Vec<MacroEntry>, usize) {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos] != ERASED_BYTE {
        let Some(name_len) = bytes[pos..].iter().position(|&b| b == 0) else {
            warn!(offset = pos, "Unterminated macro name in storage");
            break;
        };
        let body_start = pos + name_len + 1;
        let Some(body_len) = bytes
            .get(body_start..)
            .and_then(|rest| rest.iter().position(|&b| b == 0))
        else {
            warn!(offset = pos, "Unterminated macro body in storage");
            break;
        };
        let len = name_len + body_len + 2;
        entries.push(MacroEntry {
            name: String::from_utf8_lossy(&bytes[pos..pos + name_len]).into_owned(),
            body: String::from_utf8_lossy(&bytes[body_start..body_start + body_len])
                .into_owned(),
            offset: pos,
            len,
        });
        pos += len;
    }
    (entries, pos)
}

fn remove_entry(bytes: &mut [u8], entry: &MacroEntry, end: usize) {
    bytes.copy_within(entry.offset + entry.len..end, entry.offset);
    bytes[end - entry.len..end].fill(ERASED_BYTE);
}

/// Every stored macro in storage order.
pub fn list(storage: &Storage) -> Vec<MacroEntry> {
    storage.update(|bytes| scan(bytes).0)
}

/// Body of the macro called `name`.
pub fn find(storage: &Storage, name: &str) -> Option<String> {
    storage.update(|bytes| {
        scan(bytes)
            .0
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.body)
    })
}

/// Store `body` under `name`, replacing any existing definition.
///
/// # Errors
///
/// Returns [`HostError::StorageFull`] when the entry does not fit; the
/// existing definition is kept in that case.
pub fn define(storage: &Storage, name: &str, body: &str) -> HostResult<()> {
    storage.update(|bytes| {
        let (entries, end) = scan(bytes);
        let existing = entries.iter().find(|entry| entry.name == name);
        let needed = name.len() + body.len() + 2;
        let available = bytes.len() - end + existing.map_or(0, |entry| entry.len);
        if needed > available {
            return Err(HostError::StorageFull { needed, available });
        }

        let mut end = end;
        if let Some(entry) = existing {
            remove_entry(bytes, entry, end);
            end -= entry.len;
        }
        let name_end = end + name.len();
        bytes[end..name_end].copy_from_slice(name.as_bytes());
        bytes[name_end] = 0;
        bytes[name_end + 1..name_end + 1 + body.len()].copy_from_slice(body.as_bytes());
        bytes[end + needed - 1] = 0;
        debug!(name, offset = end, len = needed, "Macro stored");
        Ok(())
    })
}

/// Remove the macro called `name`. Returns whether it existed.
pub fn remove(storage: &Storage, name: &str) -> bool {
    storage.update(|bytes| {
        let (entries, end) = scan(bytes);
        match entries.iter().find(|entry| entry.name == name) {
            Some(entry) => {
                remove_entry(bytes, entry, end);
                true
            }
            None => false,
        }
    })
}

/// Used and free space.
pub fn usage(storage: &Storage) -> Usage {
    storage.update(|bytes| {
        let (_, end) = scan(bytes);
        Usage {
            used: end,
            free: bytes.len() - end,
        }
    })
}
