//! # Edge Node Library
//!
//! Wiring for the marketplace edge: configuration loading, construction of
//! the router and the fan-out topology, consumer supervision and graceful
//! shutdown. The `edge-node` binary is a thin `main` around [`EdgeNode`].

pub mod config;
pub mod handlers;
pub mod naming;
pub mod runtime;

pub use config::{ConfigError, DeploymentConfig, MaintenanceConfig, NodeConfig};
pub use handlers::LoggingHandler;
pub use naming::{DeployEnv, ResourceNamer};
pub use runtime::EdgeNode;
