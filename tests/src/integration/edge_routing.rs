//! # Edge Routing Scenarios
//!
//! ```text
//! http::Request ──→ Request::from_http ──→ EdgeRouter::route
//!                                              │
//!                     RuleEngine ──────────────┤
//!                     AuthDelegate ── StaticCredentialVerifier
//!                                              ↓
//!                                       RouterDecision
//! ```
//!
//! The router is built the way the node builds it, from a `NodeConfig`.

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use edge_node::{EdgeNode, NodeConfig};

#[cfg(test)]
use edge_router::{EdgeRouter, Request, RouterDecision, StaticCredentialVerifier};

#[cfg(test)]
const SECRET: &str = "5e1f7c0a-origin";

/// Router plus the verifier behind it, so tests can count provider calls
/// and simulate outages.
#[cfg(test)]
struct RoutingHarness {
    node: EdgeNode,
    verifier: Arc<StaticCredentialVerifier>,
}

#[cfg(test)]
impl RoutingHarness {
    fn new(configure: impl FnOnce(&mut NodeConfig)) -> Self {
        let mut config = NodeConfig::default();
        config.router.origin_secret = SECRET.to_string();
        configure(&mut config);

        let verifier = Arc::new(StaticCredentialVerifier::from_sessions([(
            "session-alice",
            "alice",
        )]));
        let node = EdgeNode::build(config, verifier.clone()).expect("valid test config");
        Self { node, verifier }
    }

    fn reference() -> Self {
        Self::new(|_| {})
    }

    fn router(&self) -> &Arc<EdgeRouter> {
        self.node.router()
    }

    async fn route_http(&self, request: http::Request<()>) -> RouterDecision {
        self.router().route(&Request::from_http(&request)).await
    }
}

#[cfg(test)]
fn http_request(method: &str, path: &str, secret: Option<&str>, token: Option<&str>) -> http::Request<()> {
    let mut builder = http::Request::builder().method(method).uri(path);
    if let Some(secret) = secret {
        builder = builder.header("X-Origin-Secret", secret);
    }
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(()).expect("valid request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_public_products_path_skips_authentication() {
        let harness = RoutingHarness::reference();

        let decision = harness
            .route_http(http_request("GET", "/products", Some(SECRET), None))
            .await;

        assert!(decision.is_forward());
        assert_eq!(harness.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_orders_without_session_is_unauthorized() {
        let harness = RoutingHarness::reference();

        let decision = harness
            .route_http(http_request("GET", "/orders", Some(SECRET), None))
            .await;
        assert_eq!(decision, RouterDecision::Reject(StatusCode::UNAUTHORIZED));

        let decision = harness
            .route_http(http_request("GET", "/orders", Some(SECRET), Some("forged")))
            .await;
        assert_eq!(decision, RouterDecision::Reject(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_orders_with_session_is_forwarded_and_cached() {
        let harness = RoutingHarness::reference();

        for _ in 0..3 {
            let decision = harness
                .route_http(http_request("POST", "/orders", Some(SECRET), Some("session-alice")))
                .await;
            assert!(decision.is_forward());
        }
        assert_eq!(harness.verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_secret_header_gates_every_rule() {
        let harness = RoutingHarness::reference();

        for secret in [None, Some("wrong"), Some("")] {
            let decision = harness
                .route_http(http_request("GET", "/products", secret, Some("session-alice")))
                .await;
            assert_eq!(decision, RouterDecision::Reject(StatusCode::FORBIDDEN));
        }
        assert_eq!(harness.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_outage_rejects_then_recovers() {
        let harness = RoutingHarness::reference();
        let request = || http_request("GET", "/orders/7", Some(SECRET), Some("session-alice"));

        harness.verifier.set_available(false);
        assert_eq!(
            harness.route_http(request()).await,
            RouterDecision::Reject(StatusCode::UNAUTHORIZED)
        );

        harness.verifier.set_available(true);
        assert!(harness.route_http(request()).await.is_forward());
        assert_eq!(harness.verifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_disabled_forwards_without_verifier() {
        let harness = RoutingHarness::new(|config| config.router.use_auth = false);

        let decision = harness
            .route_http(http_request("DELETE", "/orders/7", Some(SECRET), None))
            .await;
        assert!(decision.is_forward());
        assert_eq!(harness.verifier.calls(), 0);

        // The secret header still gates everything.
        let decision = harness
            .route_http(http_request("DELETE", "/orders/7", None, None))
            .await;
        assert_eq!(decision, RouterDecision::Reject(StatusCode::FORBIDDEN));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// With the provider down, no protected request is ever forwarded.
        #[test]
        fn prop_provider_outage_never_forwards(
            path in "/(orders|cart|account)(/[0-9]{1,3})?",
            method in prop::sample::select(vec!["GET", "POST", "PATCH", "DELETE"]),
            token in proptest::option::of(prop::sample::select(vec!["session-alice", "other"])),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let harness = RoutingHarness::reference();
            harness.verifier.set_available(false);

            let decision = runtime.block_on(
                harness.route_http(http_request(method, &path, Some(SECRET), token)),
            );
            prop_assert!(!decision.is_forward());
        }
    }
}
