//! # Edge Router
//!
//! Decides, per inbound HTTP request, whether it may reach the backend
//! compute target.
//!
//! ## Architecture
//!
//! ```text
//! Request ──→ RuleEngine::evaluate ──→ matched rule
//!                                          │
//!             ┌────────────────────────────┼───────────────────────┐
//!             ↓                            ↓                       ↓
//!          Forward            AuthenticateThenForward        FixedResponse
//!             │                            │
//!             │                  AuthDelegate (cache)
//!             │                            │
//!             │                  CredentialVerifier (port)
//!             ↓                            ↓
//!                      RouterDecision
//! ```
//!
//! ## Security
//!
//! - Default deny: no matching rule is `Reject(403)`.
//! - Authentication failures and provider outages are `Reject(401)`.
//! - The shared-secret header is compared in constant time.
//! - Rules that forward without authentication are logged on every use.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = Arc::new(config.router.compile()?);
//! let auth = Arc::new(AuthDelegate::new(verifier, Arc::new(SystemTimeSource), &config.auth));
//! let router = EdgeRouter::new(engine, auth, TargetRef::new("api-gateway"));
//!
//! match router.route(&Request::from_http(&req)).await {
//!     RouterDecision::Forward(target) => proxy(target, req).await,
//!     other => respond(other),
//! }
//! ```

pub mod adapters;
pub mod auth;
pub mod domain;
pub mod ports;
pub mod router;

pub use adapters::StaticCredentialVerifier;
pub use auth::{constant_time_compare, AuthDelegate};
pub use domain::{
    ActionConfig, AuthConfig, AuthDecision, Headers, MatchPredicate, MethodSet, PathPattern,
    Request, RouteError, RouterConfig, RouterDecision, Rule, RuleAction, RuleConfig,
    RuleConfigError, RuleEngine, TargetRef, VerifierError, DEFAULT_SECRET_HEADER,
};
pub use ports::{
    CredentialVerifier, ManualTimeSource, SystemTimeSource, TimeSource, Timestamp,
    VerifiedPrincipal,
};
pub use router::EdgeRouter;
