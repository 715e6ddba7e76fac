//! Edge router error types.
//!
//! Every routing failure is terminal for its request: the router turns it into
//! a reject decision and never retries. These types exist so the reason can be
//! logged and counted.

use thiserror::Error;

/// Why a request was not forwarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// No rule matched; the default-deny action applies.
    #[error("no routing rule matched")]
    RuleNoMatch,

    /// The identity provider answered and the credential was not accepted.
    #[error("authentication rejected: {reason}")]
    AuthRejected { reason: String },

    /// The identity provider could not be reached or answered with an error.
    #[error("identity provider unavailable: {0}")]
    AuthProviderUnavailable(String),
}

/// Errors reported by a [`CredentialVerifier`](crate::ports::CredentialVerifier).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifierError {
    /// The credential is invalid, expired or revoked.
    #[error("credential rejected: {0}")]
    Rejected(String),

    /// The provider itself failed (timeout, transport error, 5xx).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Rule set configuration errors. Raised once, when the rule set is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleConfigError {
    /// Two rules share a priority.
    #[error("duplicate rule priority {priority} ('{first}' and '{second}')")]
    DuplicatePriority {
        priority: u32,
        first: String,
        second: String,
    },

    /// A path pattern is empty, not absolute, or has a non-trailing wildcard.
    #[error("invalid path pattern '{0}'")]
    InvalidPathPattern(String),

    /// A method predicate lists no methods.
    #[error("rule '{0}' has an empty method set")]
    EmptyMethodSet(String),

    /// A header predicate has an empty header name.
    #[error("rule '{0}' has a header predicate without a name")]
    EmptyHeaderName(String),

    /// A fixed response uses a status code outside 100..=599.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A rule has no predicates and would match every request.
    #[error("rule '{0}' has no match predicates")]
    NoPredicates(String),

    /// A rule requires the shared secret but none is configured.
    #[error("rule '{0}' requires the shared secret but no secret is configured")]
    MissingSecret(String),

    /// Auth delegate settings are out of range.
    #[error("invalid auth configuration: {0}")]
    InvalidAuthConfig(String),
}
