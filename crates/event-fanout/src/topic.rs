//! # Event Topic
//!
//! Fan-out point for published events. Publishing snapshots the current
//! subscription list and enqueues one `Arc<Event>` reference into the queue of
//! every subscription whose filter matches.
//!
//! `publish` returns once every matching queue accepted the event, which is a
//! "delivery accepted" guarantee: consumers may not have seen it yet.
//! A subscription added after a publish call took its snapshot never receives
//! that event.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::FanoutError;
use crate::events::{Event, Subject};
use crate::filter::SubjectFilter;
use crate::queue::DeliveryQueue;

/// Producer-facing publish surface.
pub trait EventPublisher: Send + Sync {
    /// Validate the subject, build an event and fan it out.
    ///
    /// # Errors
    ///
    /// `InvalidSubject` for an empty subject.
    fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, FanoutError>;
}

/// Outcome of a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub event_id: Uuid,
    /// Queues that accepted the event.
    pub deliveries: usize,
}

/// Binding of a topic to a delivery queue through a filter.
#[derive(Debug)]
pub struct Subscription {
    name: String,
    filter: SubjectFilter,
    queue: Arc<DeliveryQueue>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &SubjectFilter {
        &self.filter
    }

    pub fn queue(&self) -> &Arc<DeliveryQueue> {
        &self.queue
    }

    pub fn matches(&self, subject: &Subject) -> bool {
        self.filter.matches(subject)
    }
}

/// A named topic with its subscriptions.
#[derive(Debug)]
pub struct EventTopic {
    name: String,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    events_published: AtomicU64,
}

impl EventTopic {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: RwLock::new(Vec::new()),
            events_published: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a subscription.
    ///
    /// # Errors
    ///
    /// - `DuplicateSubscription` if the name is taken on this topic
    /// - `InvalidFilter` if the filter contains empty entries
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        filter: SubjectFilter,
        queue: Arc<DeliveryQueue>,
    ) -> Result<Arc<Subscription>, FanoutError> {
        let name = name.into();
        filter.validate()?;
        if filter.is_empty() {
            warn!(
                topic = %self.name,
                subscription = %name,
                "Subscription filter is empty and will never match"
            );
        }

        let mut subscriptions = self.subscriptions.write();
        if subscriptions.iter().any(|s| s.name == name) {
            return Err(FanoutError::DuplicateSubscription {
                topic: self.name.clone(),
                subscription: name,
            });
        }

        info!(
            topic = %self.name,
            subscription = %name,
            queue = %queue.name(),
            filter = filter.mode(),
            "Subscription registered"
        );
        let subscription = Arc::new(Subscription {
            name,
            filter,
            queue,
        });
        subscriptions.push(Arc::clone(&subscription));
        Ok(subscription)
    }

    /// Fan an event out. Returns the number of queues that accepted it.
    ///
    /// Publishing the same event again enqueues it again; with no
    /// subscriptions it is a no-op.
    pub fn publish_event(&self, event: Arc<Event>) -> usize {
        let snapshot: Vec<Arc<Subscription>> = self.subscriptions.read().clone();

        let mut deliveries = 0;
        for subscription in snapshot.iter().filter(|s| s.matches(event.subject())) {
            subscription.queue.enqueue(Arc::clone(&event));
            deliveries += 1;
        }

        self.events_published.fetch_add(1, Ordering::Relaxed);
        edge_telemetry::EVENTS_PUBLISHED
            .with_label_values(&[self.name.as_str()])
            .inc();
        debug!(
            topic = %self.name,
            subject = %event.subject(),
            event_id = %event.id(),
            deliveries,
            "Event published"
        );
        deliveries
    }

    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.read().clone()
    }

    pub fn subscription(&self, name: &str) -> Option<Arc<Subscription>> {
        self.subscriptions
            .read()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl EventPublisher for EventTopic {
    fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, FanoutError> {
        let event = Arc::new(Event::try_new(subject, payload)?);
        let event_id = event.id();
        let deliveries = self.publish_event(event);
        Ok(PublishReceipt {
            event_id,
            deliveries,
        })
    }
}
