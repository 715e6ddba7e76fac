//! # Marketplace Edge Test Suite
//!
//! Cross-crate scenarios for the router and the fan-out layer.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── edge_routing.rs   # request → rule → auth → decision
//!     └── event_fanout.rs   # publish → filter → queue → consumer → DLQ
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p edge-tests
//! cargo test -p edge-tests integration::event_fanout::
//! ```

pub mod integration;
