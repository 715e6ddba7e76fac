//! Routing and authentication outcomes.

use http::StatusCode;
use std::fmt;

use crate::ports::Timestamp;

/// Opaque reference to the backend compute that receives forwarded traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRef(String);

impl TargetRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the caller must do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterDecision {
    /// Pass the request to the compute target.
    Forward(TargetRef),
    /// Refuse the request with the given status.
    Reject(StatusCode),
    /// Answer directly with a configured response.
    FixedResponse { status: StatusCode, body: String },
}

impl RouterDecision {
    pub fn is_forward(&self) -> bool {
        matches!(self, RouterDecision::Forward(_))
    }

    /// Status the caller should answer with. `None` for forwards, whose
    /// status comes from the backend.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RouterDecision::Forward(_) => None,
            RouterDecision::Reject(status) => Some(*status),
            RouterDecision::FixedResponse { status, .. } => Some(*status),
        }
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RouterDecision::Forward(_) => "forward",
            RouterDecision::Reject(_) => "reject",
            RouterDecision::FixedResponse { .. } => "fixed_response",
        }
    }
}

/// Result of checking a credential with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub authenticated: bool,
    pub principal: Option<String>,
    /// Instant (ms since epoch) after which the decision must not be reused.
    pub expires_at: Timestamp,
}

impl AuthDecision {
    pub fn allow(principal: impl Into<String>, expires_at: Timestamp) -> Self {
        Self {
            authenticated: true,
            principal: Some(principal.into()),
            expires_at,
        }
    }

    pub fn deny(expires_at: Timestamp) -> Self {
        Self {
            authenticated: false,
            principal: None,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_status() {
        assert_eq!(RouterDecision::Forward(TargetRef::new("gw")).status(), None);
        assert_eq!(
            RouterDecision::Reject(StatusCode::FORBIDDEN).status(),
            Some(StatusCode::FORBIDDEN)
        );
        let fixed = RouterDecision::FixedResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "maintenance".into(),
        };
        assert_eq!(fixed.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(fixed.label(), "fixed_response");
    }

    #[test]
    fn test_auth_decision_constructors() {
        let decision = AuthDecision::allow("user-1", 1_000);
        assert!(decision.authenticated);
        assert_eq!(decision.principal.as_deref(), Some("user-1"));
        assert_eq!(decision.expires_at, 1_000);

        let denied = AuthDecision::deny(10);
        assert!(!denied.authenticated);
        assert_eq!(denied.principal, None);
    }
}
