//! # Delivery Queue
//!
//! At-least-once buffer for one subscription, with visibility timeouts and a
//! paired dead-letter queue.
//!
//! ## Message lifecycle
//!
//! ```text
//!            enqueue
//!               │
//!               ↓
//!          ┌─────────┐   receive    ┌──────────┐  acknowledge
//!          │  Ready  │ ───────────→ │ InFlight │ ─────────────→ (gone)
//!          └─────────┘              └──────────┘
//!               ↑    release / timeout    │
//!               └──── attempts + 1 ───────┤
//!               ↑                         │ attempts == max_receive_count
//!               └── abandon (unchanged) ──┤
//!                                         ↓
//!                                  DeadLetterQueue
//! ```
//!
//! Every receive hands out a fresh [`MessageHandle`]; a handle is valid only
//! while its message is in flight, so a stale handle can never settle a later
//! delivery of the same message. An in-flight message is owned by exactly one
//! receiver until it is settled or its visibility timeout expires.
//!
//! Expired leases are reclaimed lazily, whenever the queue is touched.
//! Waiting receivers sleep no longer than the next lease deadline, so an
//! expiry is noticed without a background task.
//!
//! The state mutex is never held across an `.await`. When both are needed,
//! the queue state is locked before the dead-letter queue.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dead_letter::{DeadLetterQueue, DeadLetterRecord, DiversionCause};
use crate::error::{FanoutError, QueueError};
use crate::events::Event;

/// Largest batch a single receive may return.
pub const MAX_BATCH_SIZE: usize = 10;

/// Receipt for one delivery of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(Uuid);

impl MessageHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A received message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    handle: MessageHandle,
    message_id: Uuid,
    event: Arc<Event>,
    attempts: u32,
}

impl QueueMessage {
    pub fn handle(&self) -> MessageHandle {
        self.handle
    }

    /// Stable across redeliveries.
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    /// Failed delivery attempts before this one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Per-queue delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// How long a received message stays invisible to other receivers.
    pub visibility_timeout: Duration,
    /// Long-poll window of an empty receive.
    pub receive_wait: Duration,
    /// Upper bound of a receive batch (at most [`MAX_BATCH_SIZE`]).
    pub max_batch_size: usize,
    /// Failed attempts after which a message is dead-lettered.
    pub max_receive_count: u32,
    /// How long dead-letter records are kept.
    pub dead_letter_retention: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            receive_wait: Duration::from_secs(20),
            max_batch_size: MAX_BATCH_SIZE,
            max_receive_count: 5,
            dead_letter_retention: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

impl QueueSettings {
    pub fn validate(&self, queue: &str) -> Result<(), FanoutError> {
        let invalid = |reason: &str| FanoutError::InvalidQueueConfig {
            queue: queue.to_string(),
            reason: reason.to_string(),
        };

        if self.visibility_timeout.is_zero() {
            return Err(invalid("visibility_timeout cannot be 0"));
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(invalid("max_batch_size must be between 1 and 10"));
        }
        if self.max_receive_count == 0 {
            return Err(invalid("max_receive_count cannot be 0"));
        }
        if self.dead_letter_retention.is_zero() {
            return Err(invalid("dead_letter_retention cannot be 0"));
        }
        Ok(())
    }
}

/// Point-in-time queue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub in_flight: usize,
    pub dead_letters: usize,
}

#[derive(Debug)]
struct Pending {
    message_id: Uuid,
    event: Arc<Event>,
    attempts: u32,
}

#[derive(Debug)]
struct Lease {
    pending: Pending,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Pending>,
    in_flight: HashMap<MessageHandle, Lease>,
}

/// Visibility-timeout queue feeding one subscription's consumers.
#[derive(Debug)]
pub struct DeliveryQueue {
    name: String,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    available: Notify,
    dead_letters: Arc<DeadLetterQueue>,
}

impl DeliveryQueue {
    /// Create a queue and its dead-letter queue.
    pub fn new(
        name: impl Into<String>,
        dead_letter_name: impl Into<String>,
        settings: QueueSettings,
    ) -> Result<Self, FanoutError> {
        let name = name.into();
        settings.validate(&name)?;
        let dead_letters = Arc::new(DeadLetterQueue::new(
            dead_letter_name,
            settings.dead_letter_retention,
        ));
        Ok(Self {
            name,
            settings,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            dead_letters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterQueue> {
        &self.dead_letters
    }

    /// Accept an event for delivery. Never drops; returns the message id.
    pub fn enqueue(&self, event: Arc<Event>) -> Uuid {
        let message_id = Uuid::new_v4();
        debug!(
            queue = %self.name,
            subject = %event.subject(),
            message_id = %message_id,
            "Message enqueued"
        );

        self.state.lock().ready.push_back(Pending {
            message_id,
            event,
            attempts: 0,
        });
        edge_telemetry::MESSAGES_ENQUEUED
            .with_label_values(&[self.name.as_str()])
            .inc();
        self.available.notify_waiters();
        message_id
    }

    /// Receive up to `max` messages (clamped to `1..=max_batch_size`),
    /// waiting up to the configured `receive_wait` if none are ready.
    ///
    /// Cancel-safe: messages are leased and returned without an intervening
    /// `.await`, so dropping the future never loses a message.
    pub async fn receive(&self, max: usize) -> Vec<QueueMessage> {
        self.receive_with_wait(max, self.settings.receive_wait).await
    }

    /// [`receive`](Self::receive) with an explicit long-poll window.
    pub async fn receive_with_wait(&self, max: usize, wait: Duration) -> Vec<QueueMessage> {
        let wait_until = Instant::now() + wait;

        loop {
            // Register interest before checking state so an enqueue between
            // the check and the wait still wakes us.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_visible = {
                let mut state = self.state.lock();
                let now = Instant::now();
                self.reclaim_expired(&mut state, now);
                let batch = self.lease_batch(&mut state, max, now);
                if !batch.is_empty() {
                    return batch;
                }
                state.in_flight.values().map(|lease| lease.visible_at).min()
            };

            if Instant::now() >= wait_until {
                return Vec::new();
            }
            let wake_at = next_visible.map_or(wait_until, |at| at.min(wait_until));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    /// Receive without waiting.
    pub fn try_receive(&self, max: usize) -> Vec<QueueMessage> {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.reclaim_expired(&mut state, now);
        self.lease_batch(&mut state, max, now)
    }

    /// Delete a successfully processed message.
    pub fn acknowledge(&self, handle: MessageHandle) -> Result<(), QueueError> {
        let lease = self.settle(handle)?;
        debug!(
            queue = %self.name,
            handle = %handle,
            message_id = %lease.pending.message_id,
            "Message acknowledged"
        );
        self.count_delivery("acknowledged");
        Ok(())
    }

    /// Return a message after a failed attempt. Counts as one attempt; at the
    /// threshold the message is dead-lettered instead of requeued.
    pub fn release(&self, handle: MessageHandle) -> Result<(), QueueError> {
        let (diverted, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.reclaim_expired(&mut state, Instant::now());
            let lease = state
                .in_flight
                .remove(&handle)
                .ok_or(QueueError::UnknownHandle(handle))?;
            let diverted = self.fail_attempt(&mut state, lease.pending, DiversionCause::Released);
            (diverted, reclaimed)
        };

        debug!(queue = %self.name, handle = %handle, "Message released");
        self.count_delivery("released");
        if !diverted || reclaimed > 0 {
            self.available.notify_waiters();
        }
        Ok(())
    }

    /// Return a message the handler never saw. Immediately visible, attempt
    /// count unchanged.
    pub fn abandon(&self, handle: MessageHandle) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            self.reclaim_expired(&mut state, Instant::now());
            let lease = state
                .in_flight
                .remove(&handle)
                .ok_or(QueueError::UnknownHandle(handle))?;
            state.ready.push_front(lease.pending);
        }

        debug!(queue = %self.name, handle = %handle, "Message abandoned");
        self.count_delivery("abandoned");
        self.available.notify_waiters();
        Ok(())
    }

    /// Move up to `limit` dead-letter records back to the queue with a fresh
    /// attempt counter. Manual reprocessing only.
    pub fn redrive_dead_letters(&self, limit: usize) -> usize {
        let records = self.dead_letters.take(limit);
        if records.is_empty() {
            return 0;
        }

        let count = records.len();
        {
            let mut state = self.state.lock();
            state
                .ready
                .extend(records.into_iter().map(|record| Pending {
                    message_id: record.message_id,
                    event: record.event,
                    attempts: 0,
                }));
        }

        info!(queue = %self.name, count, "Dead letters redriven");
        self.available.notify_waiters();
        count
    }

    pub fn stats(&self) -> QueueStats {
        let (ready, in_flight, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.reclaim_expired(&mut state, Instant::now());
            (state.ready.len(), state.in_flight.len(), reclaimed)
        };
        if reclaimed > 0 {
            self.available.notify_waiters();
        }
        QueueStats {
            ready,
            in_flight,
            dead_letters: self.dead_letters.len(),
        }
    }

    fn settle(&self, handle: MessageHandle) -> Result<Lease, QueueError> {
        let (lease, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.reclaim_expired(&mut state, Instant::now());
            (state.in_flight.remove(&handle), reclaimed)
        };
        if reclaimed > 0 {
            self.available.notify_waiters();
        }
        lease.ok_or(QueueError::UnknownHandle(handle))
    }

    fn lease_batch(&self, state: &mut QueueState, max: usize, now: Instant) -> Vec<QueueMessage> {
        let max = max.clamp(1, self.settings.max_batch_size);
        let visible_at = now + self.settings.visibility_timeout;

        let mut batch = Vec::with_capacity(max.min(state.ready.len()));
        while batch.len() < max {
            let Some(pending) = state.ready.pop_front() else {
                break;
            };
            let handle = MessageHandle::new();
            batch.push(QueueMessage {
                handle,
                message_id: pending.message_id,
                event: Arc::clone(&pending.event),
                attempts: pending.attempts,
            });
            state.in_flight.insert(
                handle,
                Lease {
                    pending,
                    visible_at,
                },
            );
        }

        if !batch.is_empty() {
            debug!(queue = %self.name, count = batch.len(), "Messages received");
        }
        batch
    }

    /// Requeue leases whose visibility timeout passed. Returns how many
    /// went back to the ready list.
    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) -> usize {
        let expired: Vec<MessageHandle> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.visible_at <= now)
            .map(|(handle, _)| *handle)
            .collect();

        let mut requeued = 0;
        for handle in expired {
            if let Some(lease) = state.in_flight.remove(&handle) {
                warn!(
                    queue = %self.name,
                    handle = %handle,
                    message_id = %lease.pending.message_id,
                    attempts = lease.pending.attempts + 1,
                    "Visibility timeout expired"
                );
                self.count_delivery("expired");
                if !self.fail_attempt(state, lease.pending, DiversionCause::VisibilityTimeout) {
                    requeued += 1;
                }
            }
        }
        requeued
    }

    /// Count one failed attempt. Returns true if the message was diverted.
    fn fail_attempt(&self, state: &mut QueueState, mut pending: Pending, cause: DiversionCause) -> bool {
        pending.attempts += 1;
        if pending.attempts < self.settings.max_receive_count {
            state.ready.push_back(pending);
            return false;
        }

        error!(
            queue = %self.name,
            dead_letter_queue = %self.dead_letters.name(),
            message_id = %pending.message_id,
            subject = %pending.event.subject(),
            attempts = pending.attempts,
            cause = ?cause,
            "Message dead-lettered"
        );
        edge_telemetry::DEAD_LETTERED
            .with_label_values(&[self.name.as_str()])
            .inc();
        self.dead_letters.push(DeadLetterRecord {
            message_id: pending.message_id,
            event: pending.event,
            attempts: pending.attempts,
            cause,
            dead_lettered_at: chrono::Utc::now(),
        });
        true
    }

    fn count_delivery(&self, outcome: &str) {
        edge_telemetry::DELIVERIES
            .with_label_values(&[self.name.as_str(), outcome])
            .inc();
    }
}
