//! # Marketplace Edge Node
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load configuration (file, then environment overrides)
//! 3. Build the router and the fan-out topology
//! 4. Start queue consumers
//! 5. Run until Ctrl+C, then shut down gracefully

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use edge_node::{EdgeNode, LoggingHandler, NodeConfig};
use edge_router::StaticCredentialVerifier;
use edge_telemetry::{init_telemetry, TelemetryConfig};
use event_fanout::{MessageHandler, QueueBinding};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let config = NodeConfig::load().context("failed to load configuration")?;

    if config.auth.static_sessions.is_empty() {
        warn!("No static sessions configured; every authenticated route will be rejected");
    }
    let verifier = Arc::new(StaticCredentialVerifier::from_sessions(
        config.auth.static_sessions.clone(),
    ));

    let mut node = EdgeNode::build(config, verifier).context("invalid configuration")?;
    node.start(|binding: &QueueBinding| -> Arc<dyn MessageHandler> {
        Arc::new(LoggingHandler::new(binding.subscription.clone()))
    });

    info!("Edge node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    node.shutdown().await;
    Ok(())
}
