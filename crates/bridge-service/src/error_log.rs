//! Bounded log of telemetry source exceptions.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// Wall-clock time the exception was received (RFC 3339)
    pub received_at: String,
    pub message: String,
}

/// Keeps the most recent `capacity` entries; older ones are dropped.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<ErrorLogEntry>,
    capacity: usize,
    dropped: u64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, entry: ErrorLogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ErrorLogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Log line for a source exception code.
pub fn describe_exception(code: u32) -> String {
    let name = match code {
        0 => "NONE",
        1 => "ERROR",
        2 => "SIZE_MISMATCH",
        3 => "UNRECOGNIZED_ID",
        4 => "UNOPENED",
        5 => "VERSION_MISMATCH",
        6 => "TOO_MANY_GROUPS",
        7 => "NAME_UNRECOGNIZED",
        _ => return format!("Source exception {code}"),
    };
    format!("Source exception {code}: {name}")
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(256)
    }
}
