//! Cross-crate integration scenarios.

pub mod edge_routing;
pub mod event_fanout;
