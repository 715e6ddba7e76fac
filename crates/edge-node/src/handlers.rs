//! Default queue handler.
//!
//! Business processing lives in the services that own each queue. The node
//! ships a handler that checks the payload is JSON and logs the event, so a
//! deployment without service handlers still drains its queues and
//! malformed payloads still end in the dead-letter queue.

use async_trait::async_trait;
use event_fanout::{Event, HandlerError, MessageHandler};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug)]
pub struct LoggingHandler {
    subscription: String,
    handled: AtomicU64,
}

impl LoggingHandler {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            handled: AtomicU64::new(0),
        }
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        serde_json::from_slice::<serde_json::Value>(event.payload())
            .map_err(|e| HandlerError::failed(format!("payload is not JSON: {}", e)))?;

        self.handled.fetch_add(1, Ordering::Relaxed);
        info!(
            subscription = %self.subscription,
            subject = %event.subject(),
            event_id = %event.id(),
            bytes = event.payload().len(),
            "Event handled"
        );
        Ok(())
    }
}
