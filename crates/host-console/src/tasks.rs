//! Background task table.
//!
//! A task runs a stored macro every `interval_ms`. Slots are numbered
//! from 0 and reused once freed.

use crate::error::{ConsoleError, ConsoleResult};

/// One scheduled macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: usize,
    pub macro_name: String,
    pub interval_ms: u64,
    /// Clock reading at which the task is next due.
    pub next_due_ms: u64,
}

/// Fixed-capacity set of background tasks.
#[derive(Debug)]
pub struct TaskTable {
    slots: Vec<Option<Task>>,
}

impl TaskTable {
    #[must_use]
    pub fn new(max_tasks: usize) -> Self {
        Self {
            slots: vec![None; max_tasks],
        }
    }

    /// Schedule `macro_name`, first due at `now_ms`. A macro already
    /// scheduled keeps its slot and takes the new interval.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::TooManyTasks`] when every slot is taken.
    pub fn start(&mut self, macro_name: &str, interval_ms: u64, now_ms: u64) -> ConsoleResult<usize> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|t| t.macro_name == macro_name))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .ok_or(ConsoleError::TooManyTasks(self.slots.len()))?;
        self.slots[slot] = Some(Task {
            id: slot,
            macro_name: macro_name.to_string(),
            interval_ms,
            next_due_ms: now_ms,
        });
        Ok(slot)
    }

    /// Stop task `id`. Returns the stopped task.
    pub fn stop(&mut self, id: usize) -> Option<Task> {
        self.slots.get_mut(id).and_then(Option::take)
    }

    pub fn stop_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn get(&self, id: usize) -> Option<&Task> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    /// Scheduled tasks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().flatten()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Ids of tasks due at `now_ms`.
    #[must_use]
    pub fn due(&self, now_ms: u64) -> Vec<usize> {
        self.iter()
            .filter(|t| t.next_due_ms <= now_ms)
            .map(|t| t.id)
            .collect()
    }

    /// Push task `id` to its next due time after `now_ms`.
    pub fn rearm(&mut self, id: usize, now_ms: u64) {
        if let Some(task) = self.slots.get_mut(id).and_then(Option::as_mut) {
            task.next_due_ms = now_ms.saturating_add(task.interval_ms);
        }
    }

    /// Milliseconds from `now_ms` until the earliest task is due.
    #[must_use]
    pub fn next_deadline(&self, now_ms: u64) -> Option<u64> {
        self.iter()
            .map(|t| t.next_due_ms.saturating_sub(now_ms))
            .min()
    }
}
