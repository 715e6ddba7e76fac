//! Fan-out and delivery error types.
//!
//! Only publish-time and configuration problems are errors. Delivery
//! exhaustion is not: it shows up as a [`DeadLetterRecord`](crate::DeadLetterRecord).

use std::time::Duration;
use thiserror::Error;

use crate::queue::MessageHandle;

/// Publish and topology errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FanoutError {
    /// Subjects must be non-empty.
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// A JSON payload could not be serialized.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A topic already has a subscription with this name.
    #[error("subscription '{subscription}' already exists on topic '{topic}'")]
    DuplicateSubscription { topic: String, subscription: String },

    /// A filter would match unintended subjects.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Queue settings are out of range or inconsistent.
    #[error("invalid queue configuration for '{queue}': {reason}")]
    InvalidQueueConfig { queue: String, reason: String },
}

/// Errors from acknowledging or releasing a received message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The handle is not in flight: already settled, or its visibility
    /// timeout expired and the message went back to the queue.
    #[error("unknown or expired message handle {0}")]
    UnknownHandle(MessageHandle),
}

/// Failure reported by a message handler. The message is released.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
}

impl HandlerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }
}
