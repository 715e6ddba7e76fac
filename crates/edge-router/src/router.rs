//! # Edge Router
//!
//! Per-request orchestration of the rule engine and the auth delegate.
//!
//! | Matched action               | Outcome                                      |
//! |------------------------------|----------------------------------------------|
//! | `Forward`                    | `Forward(target)`, auth delegate not called  |
//! | `AuthenticateThenForward`    | `Forward(target)` if authenticated, else 401 |
//! | `FixedResponse`              | the configured response                      |
//! | no match                     | `Reject(403)`                                |
//!
//! Authentication failures of every kind (no credential, refused credential,
//! provider down) end in `Reject(401)`. Nothing defaults to allow.

use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthDelegate;
use crate::domain::{Request, RouteError, RouterDecision, Rule, RuleAction, RuleEngine, TargetRef};

/// Request router for the edge listener.
#[derive(Debug)]
pub struct EdgeRouter {
    engine: Arc<RuleEngine>,
    auth: Arc<AuthDelegate>,
    target: TargetRef,
}

impl EdgeRouter {
    pub fn new(engine: Arc<RuleEngine>, auth: Arc<AuthDelegate>, target: TargetRef) -> Self {
        for rule in engine.rules() {
            info!(
                rule = %rule.name(),
                priority = rule.priority(),
                action = ?rule.action(),
                "Routing rule loaded"
            );
        }
        Self {
            engine,
            auth,
            target,
        }
    }

    /// Decide what happens to `request`.
    pub async fn route(&self, request: &Request) -> RouterDecision {
        let decision = match self.engine.evaluate(request) {
            None => {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    error = %RouteError::RuleNoMatch,
                    "Default deny"
                );
                RouterDecision::Reject(StatusCode::FORBIDDEN)
            }
            Some(rule) => self.apply(rule, request).await,
        };

        edge_telemetry::metric_inc!(edge_telemetry::ROUTER_DECISIONS, &[decision.label()]);
        decision
    }

    async fn apply(&self, rule: &Rule, request: &Request) -> RouterDecision {
        match rule.action() {
            RuleAction::Forward => {
                info!(
                    rule = %rule.name(),
                    method = %request.method(),
                    path = %request.path(),
                    "Forwarding without authentication"
                );
                RouterDecision::Forward(self.target.clone())
            }
            RuleAction::FixedResponse { status, body } => {
                debug!(rule = %rule.name(), status = status.as_u16(), "Fixed response");
                RouterDecision::FixedResponse {
                    status: *status,
                    body: body.clone(),
                }
            }
            RuleAction::AuthenticateThenForward => match self.authenticate(request).await {
                Ok(principal) => {
                    debug!(
                        rule = %rule.name(),
                        principal = %principal,
                        path = %request.path(),
                        "Authenticated, forwarding"
                    );
                    RouterDecision::Forward(self.target.clone())
                }
                Err(err) => {
                    match &err {
                        RouteError::AuthProviderUnavailable(_) => {
                            warn!(rule = %rule.name(), error = %err, "Rejecting request")
                        }
                        _ => debug!(rule = %rule.name(), error = %err, "Rejecting request"),
                    }
                    RouterDecision::Reject(StatusCode::UNAUTHORIZED)
                }
            },
        }
    }

    async fn authenticate(&self, request: &Request) -> Result<String, RouteError> {
        let credential = request.credential().ok_or_else(|| RouteError::AuthRejected {
            reason: "no credential presented".into(),
        })?;

        let decision = self.auth.authenticate(credential).await?;
        if !decision.authenticated {
            return Err(RouteError::AuthRejected {
                reason: "credential not accepted".into(),
            });
        }
        Ok(decision.principal.unwrap_or_default())
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn auth(&self) -> &AuthDelegate {
        &self.auth
    }
}
