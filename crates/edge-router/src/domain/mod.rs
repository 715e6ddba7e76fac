//! Domain layer for the edge router.

pub mod config;
pub mod decision;
pub mod error;
pub mod request;
pub mod rules;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use request::*;
pub use rules::*;
