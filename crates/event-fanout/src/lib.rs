//! # Event Fan-out
//!
//! Reliable delivery of domain events from one producer to any number of
//! independently consuming services.
//!
//! ## Architecture
//!
//! ```text
//!  publish(subject, payload)
//!            │
//!            ↓
//!     ┌─────────────┐   filter    ┌───────────────┐   receive   ┌──────────┐
//!     │ EventTopic  │ ──────────→ │ DeliveryQueue │ ──────────→ │ Consumer │
//!     │             │ ──┐         └───────────────┘ ←────────── └──────────┘
//!     └─────────────┘   │                │         ack / release
//!                       │                │ attempts exhausted
//!                       │                ↓
//!                       │         DeadLetterQueue
//!                       │
//!                       └──→ (one queue per matching subscription)
//! ```
//!
//! ## Guarantees
//!
//! - At-least-once delivery; handlers must be idempotent.
//! - No ordering guarantee within or across queues.
//! - An in-flight message is held by one consumer at a time.
//! - A message is dead-lettered exactly once, on its `max_receive_count`-th
//!   failed attempt, and never retried automatically afterwards.
//! - An accepted publish is never dropped.

pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod events;
pub mod filter;
pub mod queue;
pub mod topic;

pub use config::{FanoutConfig, QueueBinding, SubscriptionConfig, TopicConfig, Topology};
pub use consumer::{Consumer, ConsumerReport, ConsumerSettings, HandlingMode, MessageHandler};
pub use dead_letter::{DeadLetterQueue, DeadLetterRecord, DiversionCause};
pub use error::{FanoutError, HandlerError, QueueError};
pub use events::{Event, Subject};
pub use filter::SubjectFilter;
pub use queue::{
    DeliveryQueue, MessageHandle, QueueMessage, QueueSettings, QueueStats, MAX_BATCH_SIZE,
};
pub use topic::{EventPublisher, EventTopic, PublishReceipt, Subscription};
