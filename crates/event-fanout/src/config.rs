//! Fan-out topology configuration.
//!
//! ```toml
//! [[fanout.topics]]
//! name = "EventBus"
//!
//! [[fanout.topics.subscriptions]]
//! name = "orders"
//! queue = "orders"
//! filter = { mode = "prefix", prefixes = ["order."] }
//! visibility_timeout = "30s"
//! ```
//!
//! Without any topics configured, the reference topology is used.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::consumer::{ConsumerSettings, HandlingMode};
use crate::error::FanoutError;
use crate::filter::SubjectFilter;
use crate::queue::{DeliveryQueue, QueueSettings, MAX_BATCH_SIZE};
use crate::topic::EventTopic;

/// `[fanout]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub topics: Vec<TopicConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// One subscription and the queue behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub name: String,
    /// Base queue name; the deployment prefix is applied when building.
    pub queue: String,
    pub filter: SubjectFilter,
    pub max_receive_count: u32,
    #[serde(with = "humantime_serde")]
    pub visibility_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub receive_wait: Duration,
    pub max_batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub dead_letter_retention: Duration,
    /// Concurrent consumers competing on the queue.
    pub consumers: usize,
    #[serde(with = "humantime_serde")]
    pub handler_timeout: Duration,
    pub handling: HandlingMode,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        let queue = QueueSettings::default();
        Self {
            name: String::new(),
            queue: String::new(),
            filter: SubjectFilter::Prefix {
                prefixes: Vec::new(),
            },
            max_receive_count: queue.max_receive_count,
            visibility_timeout: queue.visibility_timeout,
            receive_wait: queue.receive_wait,
            max_batch_size: queue.max_batch_size,
            dead_letter_retention: queue.dead_letter_retention,
            consumers: 1,
            handler_timeout: Duration::from_secs(30),
            handling: HandlingMode::PerMessage,
        }
    }
}

impl SubscriptionConfig {
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            visibility_timeout: self.visibility_timeout,
            receive_wait: self.receive_wait,
            max_batch_size: self.max_batch_size,
            max_receive_count: self.max_receive_count,
            dead_letter_retention: self.dead_letter_retention,
        }
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch_size: self.max_batch_size.min(MAX_BATCH_SIZE),
            handler_timeout: self.handler_timeout,
            mode: self.handling,
        }
    }

    pub fn validate(&self) -> Result<(), FanoutError> {
        let invalid = |reason: String| FanoutError::InvalidQueueConfig {
            queue: self.queue.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("subscription name cannot be empty".into()));
        }
        if self.queue.trim().is_empty() {
            return Err(invalid(format!("subscription '{}' has no queue", self.name)));
        }
        if self.consumers == 0 {
            return Err(invalid("consumers cannot be 0".into()));
        }
        if self.handler_timeout.is_zero() {
            return Err(invalid("handler_timeout cannot be 0".into()));
        }
        if self.visibility_timeout < self.handler_timeout {
            return Err(invalid(format!(
                "visibility_timeout ({:?}) is shorter than handler_timeout ({:?})",
                self.visibility_timeout, self.handler_timeout
            )));
        }
        self.filter.validate()?;
        self.queue_settings().validate(&self.queue)
    }
}

impl FanoutConfig {
    /// Reference topology: topic `EventBus` feeding an orders queue
    /// (`order.` prefix) and an inventory queue (`inventory.` prefix or
    /// exactly `order.paid`).
    pub fn reference() -> Self {
        Self {
            topics: vec![TopicConfig {
                name: "EventBus".into(),
                subscriptions: vec![
                    SubscriptionConfig {
                        name: "orders".into(),
                        queue: "orders".into(),
                        filter: SubjectFilter::Prefix {
                            prefixes: vec!["order.".into()],
                        },
                        ..SubscriptionConfig::default()
                    },
                    SubscriptionConfig {
                        name: "inventory".into(),
                        queue: "inventory".into(),
                        filter: SubjectFilter::Combined {
                            prefixes: vec!["inventory.".into()],
                            subjects: vec!["order.paid".into()],
                        },
                        ..SubscriptionConfig::default()
                    },
                ],
            }],
        }
    }

    /// Topics to build: the configured ones, or the reference topology.
    pub fn effective(&self) -> FanoutConfig {
        if self.topics.is_empty() {
            Self::reference()
        } else {
            self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), FanoutError> {
        let mut topics = HashSet::new();
        let mut queues = HashSet::new();

        for topic in &self.effective().topics {
            if topic.name.trim().is_empty() {
                return Err(FanoutError::InvalidQueueConfig {
                    queue: String::new(),
                    reason: "topic name cannot be empty".into(),
                });
            }
            if !topics.insert(topic.name.clone()) {
                return Err(FanoutError::InvalidQueueConfig {
                    queue: topic.name.clone(),
                    reason: "duplicate topic name".into(),
                });
            }

            let mut names = HashSet::new();
            for subscription in &topic.subscriptions {
                subscription.validate()?;
                if !names.insert(subscription.name.as_str()) {
                    return Err(FanoutError::DuplicateSubscription {
                        topic: topic.name.clone(),
                        subscription: subscription.name.clone(),
                    });
                }
                if !queues.insert(subscription.queue.clone()) {
                    return Err(FanoutError::InvalidQueueConfig {
                        queue: subscription.queue.clone(),
                        reason: "queue bound to more than one subscription".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Build topics and queues. `resolve` maps a base queue name to the
    /// deployed name; the dead-letter queue is `<resolved>-dlq`.
    pub fn build(&self, resolve: impl Fn(&str) -> String) -> Result<Topology, FanoutError> {
        self.validate()?;

        let mut topology = Topology::default();
        for topic_config in self.effective().topics {
            let topic = Arc::new(EventTopic::new(topic_config.name.clone()));
            for subscription in &topic_config.subscriptions {
                let queue_name = resolve(&subscription.queue);
                let queue = Arc::new(DeliveryQueue::new(
                    queue_name.clone(),
                    format!("{}-dlq", queue_name),
                    subscription.queue_settings(),
                )?);
                topic.subscribe(
                    subscription.name.clone(),
                    subscription.filter.clone(),
                    Arc::clone(&queue),
                )?;
                topology.bindings.push(QueueBinding {
                    topic: topic_config.name.clone(),
                    subscription: subscription.name.clone(),
                    queue,
                    consumers: subscription.consumers,
                    consumer_settings: subscription.consumer_settings(),
                });
            }
            topology.topics.push(topic);
        }
        Ok(topology)
    }
}

/// Built topics plus the queues their consumers read from.
#[derive(Debug, Default)]
pub struct Topology {
    pub topics: Vec<Arc<EventTopic>>,
    pub bindings: Vec<QueueBinding>,
}

impl Topology {
    pub fn topic(&self, name: &str) -> Option<&Arc<EventTopic>> {
        self.topics.iter().find(|t| t.name() == name)
    }

    pub fn binding(&self, subscription: &str) -> Option<&QueueBinding> {
        self.bindings.iter().find(|b| b.subscription == subscription)
    }
}

/// A subscription's queue and how it should be consumed.
#[derive(Debug, Clone)]
pub struct QueueBinding {
    pub topic: String,
    pub subscription: String,
    pub queue: Arc<DeliveryQueue>,
    pub consumers: usize,
    pub consumer_settings: ConsumerSettings,
}
