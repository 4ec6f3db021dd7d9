use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// One applied mutation, as tailed by the broadcast layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub sequence: u64,
    pub table: String,
    pub row: String,
    /// Rendered row; empty for a delete.
    pub value: String,
}

/// Bounded change stream plus the `last_update` signal.
///
/// Sequence numbers keep increasing when old entries fall off the front.
#[derive(Debug)]
pub struct ChangeLog {
    entries: VecDeque<ChangeEvent>,
    capacity: usize,
    next_sequence: u64,
    last_update: u64,
    revision: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ChangeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_sequence: 1,
            last_update: 0,
            revision: 0,
        }
    }

    pub fn push(&mut self, table: &str, row: &str, value: String) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if self.capacity > 0 {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(ChangeEvent {
                sequence,
                table: table.to_string(),
                row: row.to_string(),
                value,
            });
        }
        self.touch();
        sequence
    }

    /// Bump `last_update` without a log entry. Speculative submissions use this.
    pub fn touch(&mut self) {
        self.last_update = self.last_update.max(now_millis());
        self.revision += 1;
    }

    /// Retained entries with a sequence number greater than `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<ChangeEvent> {
        let start = self.entries.partition_point(|e| e.sequence <= sequence);
        self.entries.range(start..).cloned().collect()
    }

    /// Milliseconds since the epoch of the latest change; never decreases.
    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    /// Count of changes so far. Unlike `last_update` it cannot collide
    /// within one millisecond.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
