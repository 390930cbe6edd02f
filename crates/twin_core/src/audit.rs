//! Bounded transaction audit log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::TransactionRecord;

/// Append-only ring of the most recent vehicle transactions, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<TransactionRecord>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a record, dropping the oldest once the log is full.
    pub fn record(&mut self, record: TransactionRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in chronological order (newest last).
    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&TransactionRecord> {
        self.entries.back()
    }

    /// Owned copy of the log, newest last.
    pub fn to_vec(&self) -> Vec<TransactionRecord> {
        self.entries.iter().cloned().collect()
    }
}
