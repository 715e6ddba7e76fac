//! # Edge Node Runtime
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Compile the rule set and build the auth delegate
//! 3. Build topics, subscriptions and delivery queues
//! 4. Spawn consumers (one task per configured consumer per queue)
//! 5. Spawn the maintenance task
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown on the watch channel
//! 2. Consumers stop receiving, settle the message in hand and abandon the
//!    rest of their batch
//! 3. Wait for consumers up to the grace period
//! 4. Log a metrics snapshot

use edge_router::{
    AuthDelegate, CredentialVerifier, EdgeRouter, SystemTimeSource, TargetRef, TimeSource,
};
use event_fanout::{Consumer, ConsumerReport, EventTopic, MessageHandler, QueueBinding, Topology};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, NodeConfig};

/// Running edge node.
pub struct EdgeNode {
    config: NodeConfig,
    router: Arc<EdgeRouter>,
    topology: Topology,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    consumers: Vec<JoinHandle<ConsumerReport>>,
    maintenance: Option<JoinHandle<()>>,
}

impl EdgeNode {
    /// Build the router and the fan-out topology.
    pub fn build(
        config: NodeConfig,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, ConfigError> {
        Self::build_with_clock(config, verifier, Arc::new(SystemTimeSource))
    }

    pub fn build_with_clock(
        config: NodeConfig,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let engine = Arc::new(config.router.compile()?);
        let auth = Arc::new(AuthDelegate::new(verifier, clock, &config.auth));
        let router = Arc::new(EdgeRouter::new(
            engine,
            auth,
            TargetRef::new(config.router.target.clone()),
        ));

        let namer = config.namer();
        let topology = config.fanout.build(|base| namer.name(base))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            project = %config.deployment.project,
            environment = %config.deployment.environment,
            rules = router.rules().len(),
            topics = topology.topics.len(),
            queues = topology.bindings.len(),
            "Edge node built"
        );

        Ok(Self {
            config,
            router,
            topology,
            shutdown_tx,
            shutdown_rx,
            consumers: Vec::new(),
            maintenance: None,
        })
    }

    /// Spawn consumers and the maintenance task. `handler_for` picks the
    /// handler of each subscription.
    pub fn start<F>(&mut self, handler_for: F)
    where
        F: Fn(&QueueBinding) -> Arc<dyn MessageHandler>,
    {
        for binding in &self.topology.bindings {
            let handler = handler_for(binding);
            for index in 0..binding.consumers {
                let consumer = Consumer::new(
                    format!("{}-{}", binding.subscription, index),
                    Arc::clone(&binding.queue),
                    Arc::clone(&handler),
                    binding.consumer_settings.clone(),
                );
                let shutdown = self.shutdown_rx.clone();
                self.consumers.push(tokio::spawn(consumer.run(shutdown)));
            }
        }

        self.maintenance = Some(self.spawn_maintenance());
        info!(consumers = self.consumers.len(), "Edge node started");
    }

    fn spawn_maintenance(&self) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let queues: Vec<_> = self
            .topology
            .bindings
            .iter()
            .map(|b| Arc::clone(&b.queue))
            .collect();
        let interval = self.config.maintenance.interval;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let auth_purged = router.auth().purge_expired();
                        let now = chrono::Utc::now();
                        let dead_purged: usize = queues
                            .iter()
                            .map(|q| q.dead_letters().purge_expired(now))
                            .sum();
                        debug!(auth_purged, dead_purged, "Maintenance pass");
                    }
                }
            }
        })
    }

    pub fn router(&self) -> &Arc<EdgeRouter> {
        &self.router
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topic(&self, name: &str) -> Option<Arc<EventTopic>> {
        self.topology.topic(name).cloned()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Stop consumers and wait for them up to the grace period.
    pub async fn shutdown(mut self) -> Vec<ConsumerReport> {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let grace = self.config.maintenance.shutdown_grace;
        let mut reports = Vec::with_capacity(self.consumers.len());
        for handle in self.consumers.drain(..) {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => error!(error = %e, "Consumer task failed"),
                Err(_) => warn!(grace = ?grace, "Consumer did not stop within grace period"),
            }
        }
        if let Some(maintenance) = self.maintenance.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), maintenance).await;
        }

        match edge_telemetry::gather_metrics() {
            Ok(snapshot) => debug!(metrics = %snapshot, "Final metrics snapshot"),
            Err(e) => warn!(error = %e, "Could not gather metrics"),
        }
        info!(consumers = reports.len(), "Shutdown complete");
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::LoggingHandler;
    use bytes::Bytes;
    use edge_router::{Request, RouterDecision, StaticCredentialVerifier};
    use event_fanout::EventPublisher;

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.router.origin_secret = "c0ffee".into();
        config
    }

    #[tokio::test]
    async fn test_build_reference_node() {
        let verifier = Arc::new(StaticCredentialVerifier::from_sessions([("tok", "alice")]));
        let node = EdgeNode::build(config(), verifier).unwrap();

        assert_eq!(node.router().rules().len(), 2);
        let orders = node.topology().binding("orders").unwrap();
        assert_eq!(orders.queue.name(), "marketplace-dev-orders");

        let request = Request::new("GET", "/orders")
            .with_header("X-Origin-Secret", "c0ffee")
            .with_credential("tok");
        assert!(node.router().route(&request).await.is_forward());
        assert!(matches!(
            node.router().route(&Request::new("GET", "/orders")).await,
            RouterDecision::Reject(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let verifier = Arc::new(StaticCredentialVerifier::new());
        assert!(matches!(
            EdgeNode::build(NodeConfig::default(), verifier),
            Err(ConfigError::Rules(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumers_drain_and_stop() {
        let verifier = Arc::new(StaticCredentialVerifier::new());
        let mut node = EdgeNode::build(config(), verifier).unwrap();
        node.start(|binding| -> Arc<dyn MessageHandler> {
            Arc::new(LoggingHandler::new(binding.subscription.clone()))
        });

        let bus = node.topic("EventBus").unwrap();
        bus.publish("order.paid", Bytes::from_static(br#"{"order_id":1}"#))
            .unwrap();

        let orders = Arc::clone(&node.topology().binding("orders").unwrap().queue);
        let inventory = Arc::clone(&node.topology().binding("inventory").unwrap().queue);
        while orders.stats() != Default::default() || inventory.stats() != Default::default() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let reports = node.shutdown().await;
        assert_eq!(reports.len(), 2);
        let acknowledged: u64 = reports.iter().map(|r| r.acknowledged).sum();
        assert_eq!(acknowledged, 2);
    }
}
