//! # Dead-Letter Queue
//!
//! Append-only store for messages that exhausted their delivery attempts.
//! Records leave only by manual redrive or by ageing past the retention
//! period; nothing reprocesses them automatically.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::events::Event;

/// Why the final delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiversionCause {
    /// The consumer released the message (handler failure or timeout).
    Released,
    /// The visibility timeout expired without an acknowledgment.
    VisibilityTimeout,
}

/// A diverted message.
#[derive(Debug, Clone)]
pub struct DeadLetterRecord {
    pub message_id: Uuid,
    pub event: Arc<Event>,
    /// Failed attempts at the time of diversion.
    pub attempts: u32,
    pub cause: DiversionCause,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Dead-letter queue paired with one delivery queue.
#[derive(Debug)]
pub struct DeadLetterQueue {
    name: String,
    retention: Duration,
    records: Mutex<VecDeque<DeadLetterRecord>>,
}

impl DeadLetterQueue {
    pub fn new(name: impl Into<String>, retention: Duration) -> Self {
        Self {
            name: name.into(),
            retention,
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub(crate) fn push(&self, record: DeadLetterRecord) {
        let depth = {
            let mut records = self.records.lock();
            records.push_back(record);
            records.len()
        };
        self.update_depth(depth);
    }

    /// Remove up to `limit` of the oldest records.
    pub(crate) fn take(&self, limit: usize) -> Vec<DeadLetterRecord> {
        let (taken, depth) = {
            let mut records = self.records.lock();
            let n = limit.min(records.len());
            let taken: Vec<_> = records.drain(..n).collect();
            (taken, records.len())
        };
        self.update_depth(depth);
        taken
    }

    /// Copy of the current records, oldest first.
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn contains(&self, message_id: Uuid) -> bool {
        self.records
            .lock()
            .iter()
            .any(|record| record.message_id == message_id)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop records older than the retention period. Returns how many went.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        // Out of chrono's range means nothing can be old enough.
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return 0;
        };
        let (purged, depth) = {
            let mut records = self.records.lock();
            let before = records.len();
            records.retain(|record| {
                record
                    .dead_lettered_at
                    .checked_add_signed(retention)
                    .map_or(true, |expires| expires > now)
            });
            (before - records.len(), records.len())
        };
        self.update_depth(depth);
        purged
    }

    fn update_depth(&self, depth: usize) {
        edge_telemetry::DEAD_LETTER_DEPTH
            .with_label_values(&[self.name.as_str()])
            .set(depth as i64);
    }
}
