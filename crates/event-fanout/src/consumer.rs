//! # Consumer
//!
//! Pulls batches from a [`DeliveryQueue`] and hands events to a
//! [`MessageHandler`]. Every message is settled on its own: success
//! acknowledges it; failure, timeout or a handler panic releases it. A failing message in a
//! batch never causes the others to be redelivered.
//!
//! ## Shutdown
//!
//! When the shutdown channel flips to `true` the consumer stops receiving.
//! A handler call already running completes and its message is settled.
//! Messages of the current batch that were not yet handed to the handler
//! are abandoned: visible again at once, attempt count unchanged.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, QueueError};
use crate::events::Event;
use crate::queue::{DeliveryQueue, QueueMessage, MAX_BATCH_SIZE};

/// Service-specific event processing.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;

    /// Process a whole batch, returning one result per event in order.
    /// Missing results count as failures.
    async fn handle_batch(&self, events: &[Arc<Event>]) -> Vec<Result<(), HandlerError>> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.handle(event).await);
        }
        results
    }
}

/// Whether the handler sees messages one at a time or a batch at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlingMode {
    #[default]
    PerMessage,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    /// Limit for one handler call (one message, or one batch in batch mode).
    pub handler_timeout: Duration,
    pub mode: HandlingMode,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            handler_timeout: Duration::from_secs(30),
            mode: HandlingMode::PerMessage,
        }
    }
}

/// Settlement counts of a consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub batches: u64,
    pub acknowledged: u64,
    pub released: u64,
    pub abandoned: u64,
    /// Settlements refused because the lease had already expired.
    pub lost_leases: u64,
}

pub struct Consumer {
    name: String,
    queue: Arc<DeliveryQueue>,
    handler: Arc<dyn MessageHandler>,
    settings: ConsumerSettings,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("name", &self.name)
            .field("queue", &self.queue.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Consumer {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<DeliveryQueue>,
        handler: Arc<dyn MessageHandler>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            handler,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive and process until shutdown is signalled or the sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ConsumerReport {
        info!(consumer = %self.name, queue = %self.queue.name(), "Consumer started");
        let mut report = ConsumerReport::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                batch = self.queue.receive(self.settings.batch_size) => batch,
            };

            if batch.is_empty() {
                continue;
            }
            report.batches += 1;
            self.process(batch, &shutdown, &mut report).await;
        }

        info!(
            consumer = %self.name,
            queue = %self.queue.name(),
            acknowledged = report.acknowledged,
            released = report.released,
            abandoned = report.abandoned,
            "Consumer stopped"
        );
        report
    }

    /// Hand one received batch to the handler and settle every message.
    pub async fn process(
        &self,
        batch: Vec<QueueMessage>,
        shutdown: &watch::Receiver<bool>,
        report: &mut ConsumerReport,
    ) {
        match self.settings.mode {
            HandlingMode::PerMessage => self.process_each(batch, shutdown, report).await,
            HandlingMode::Batch => self.process_batch(batch, shutdown, report).await,
        }
    }

    async fn process_each(
        &self,
        batch: Vec<QueueMessage>,
        shutdown: &watch::Receiver<bool>,
        report: &mut ConsumerReport,
    ) {
        let mut messages = batch.into_iter();
        while let Some(message) = messages.next() {
            if *shutdown.borrow() {
                self.abandon(std::iter::once(message).chain(messages), report);
                return;
            }

            let result = self
                .guarded(self.handler.handle(message.event()))
                .await
                .and_then(|result| result);
            self.settle(&message, result, report);
        }
    }

    async fn process_batch(
        &self,
        batch: Vec<QueueMessage>,
        shutdown: &watch::Receiver<bool>,
        report: &mut ConsumerReport,
    ) {
        if *shutdown.borrow() {
            self.abandon(batch, report);
            return;
        }

        let events: Vec<Arc<Event>> = batch.iter().map(|m| Arc::clone(m.event())).collect();
        let results = match self.guarded(self.handler.handle_batch(&events)).await {
            Ok(results) => results,
            Err(err) => vec![Err(err); events.len()],
        };

        let mut results = results.into_iter();
        for message in &batch {
            let result = results
                .next()
                .unwrap_or_else(|| Err(HandlerError::failed("no result reported for message")));
            self.settle(message, result, report);
        }
    }

    /// Run one handler call under the handler timeout. A panic inside the
    /// handler is a failure of that call and never unwinds into the consumer.
    async fn guarded<T>(&self, call: impl Future<Output = T>) -> Result<T, HandlerError> {
        let timeout = self.settings.handler_timeout;
        match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(panic)) => {
                let reason = panic_message(&*panic);
                error!(
                    consumer = %self.name,
                    queue = %self.queue.name(),
                    reason = %reason,
                    "Handler panicked"
                );
                Err(HandlerError::failed(format!("handler panicked: {}", reason)))
            }
            Err(_) => Err(HandlerError::TimedOut(timeout)),
        }
    }

    fn settle(
        &self,
        message: &QueueMessage,
        result: Result<(), HandlerError>,
        report: &mut ConsumerReport,
    ) {
        let settled = match result {
            Ok(()) => self.queue.acknowledge(message.handle()).map(|()| {
                report.acknowledged += 1;
            }),
            Err(err) => {
                warn!(
                    consumer = %self.name,
                    queue = %self.queue.name(),
                    message_id = %message.message_id(),
                    subject = %message.event().subject(),
                    attempts = message.attempts() + 1,
                    error = %err,
                    "Handler failed, releasing message"
                );
                self.queue.release(message.handle()).map(|()| {
                    report.released += 1;
                })
            }
        };

        if let Err(QueueError::UnknownHandle(handle)) = settled {
            report.lost_leases += 1;
            warn!(
                consumer = %self.name,
                queue = %self.queue.name(),
                handle = %handle,
                "Lease expired before settlement, message will be redelivered"
            );
        }
    }

    fn abandon(&self, messages: impl IntoIterator<Item = QueueMessage>, report: &mut ConsumerReport) {
        for message in messages {
            if self.queue.abandon(message.handle()).is_ok() {
                report.abandoned += 1;
            }
        }
        debug!(
            consumer = %self.name,
            abandoned = report.abandoned,
            "Unprocessed messages returned on shutdown"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
