//! Router configuration with validation.
//!
//! Rules are declared in configuration and compiled once into a
//! [`RuleEngine`]. When no rules are declared, the reference listener is
//! used: a public `GET /products` path and an authenticated catch-all, both
//! gated by the shared-secret header.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use super::error::RuleConfigError;
use super::rules::{MatchPredicate, Rule, RuleAction, RuleEngine};

/// Header carrying the value shared between the CDN and the router.
pub const DEFAULT_SECRET_HEADER: &str = "X-Origin-Secret";

/// Router section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Name of the shared-secret header.
    pub secret_header: String,
    /// Expected value of the shared-secret header.
    pub origin_secret: String,
    /// Compute target that receives forwarded requests.
    pub target: String,
    /// When false, authenticate-then-forward rules are compiled to forward.
    pub use_auth: bool,
    /// Routing rules. Empty means the reference rule set.
    pub rules: Vec<RuleConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            secret_header: DEFAULT_SECRET_HEADER.to_string(),
            origin_secret: String::new(),
            target: "api-gateway".to_string(),
            use_auth: true,
            rules: Vec::new(),
        }
    }
}

/// One `[[router.rules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub priority: u32,
    /// Require the shared-secret header (default true).
    #[serde(default = "default_require_secret")]
    pub require_secret: bool,
    /// Path pattern, `/exact` or `/prefix*`.
    #[serde(default)]
    pub path: Option<String>,
    /// Allowed methods; `*` allows any.
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    /// Additional header-equals predicates.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub action: ActionConfig,
}

fn default_require_secret() -> bool {
    true
}

/// Rule action as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    Forward,
    AuthenticateThenForward,
    FixedResponse { status: u16, body: String },
}

impl RouterConfig {
    /// The reference two-tier rule set.
    pub fn reference_rules() -> Vec<RuleConfig> {
        vec![
            RuleConfig {
                name: "public-products".into(),
                priority: 1,
                require_secret: true,
                path: Some("/products".into()),
                methods: Some(vec!["GET".into()]),
                headers: BTreeMap::new(),
                action: ActionConfig::Forward,
            },
            RuleConfig {
                name: "authenticated-default".into(),
                priority: 2,
                require_secret: true,
                path: Some("/*".into()),
                methods: None,
                headers: BTreeMap::new(),
                action: ActionConfig::AuthenticateThenForward,
            },
        ]
    }

    /// Rules that will be compiled: the configured ones, or the reference set.
    pub fn effective_rules(&self) -> Vec<RuleConfig> {
        if self.rules.is_empty() {
            Self::reference_rules()
        } else {
            self.rules.clone()
        }
    }

    /// Validate and compile the rule set.
    pub fn compile(&self) -> Result<RuleEngine, RuleConfigError> {
        let rules = self
            .effective_rules()
            .iter()
            .map(|rule| self.compile_rule(rule))
            .collect::<Result<Vec<_>, _>>()?;
        RuleEngine::new(rules)
    }

    fn compile_rule(&self, config: &RuleConfig) -> Result<Rule, RuleConfigError> {
        let action = match &config.action {
            ActionConfig::Forward => RuleAction::Forward,
            ActionConfig::AuthenticateThenForward if !self.use_auth => {
                warn!(
                    rule = %config.name,
                    priority = config.priority,
                    "Authentication disabled, rule downgraded to forward"
                );
                RuleAction::Forward
            }
            ActionConfig::AuthenticateThenForward => RuleAction::AuthenticateThenForward,
            ActionConfig::FixedResponse { status, body } => {
                RuleAction::fixed_response(*status, body.clone())?
            }
        };

        let mut rule = Rule::new(config.name.clone(), config.priority, action);

        if config.require_secret {
            if self.origin_secret.is_empty() {
                return Err(RuleConfigError::MissingSecret(config.name.clone()));
            }
            rule = rule.when(MatchPredicate::header_equals(
                self.secret_header.clone(),
                self.origin_secret.clone(),
            ));
        }
        for (name, value) in &config.headers {
            rule = rule.when(MatchPredicate::header_equals(name.clone(), value.clone()));
        }
        if let Some(path) = &config.path {
            rule = rule.when(MatchPredicate::path(path)?);
        }
        if let Some(methods) = &config.methods {
            rule = rule.when(MatchPredicate::methods(methods.iter().cloned()));
        }

        Ok(rule)
    }
}

/// Auth delegate section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long a decision may be served from cache.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Decision lifetime when the provider does not report a session expiry.
    #[serde(with = "humantime_serde")]
    pub session_timeout: Duration,
    /// Maximum number of cached decisions.
    pub cache_capacity: usize,
    /// Development sessions: credential → principal.
    pub static_sessions: BTreeMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5 * 60),
            session_timeout: Duration::from_secs(6 * 60 * 60),
            cache_capacity: 10_000,
            static_sessions: BTreeMap::new(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(RuleConfigError::InvalidAuthConfig(
                "cache_ttl cannot be 0".into(),
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(RuleConfigError::InvalidAuthConfig(
                "session_timeout cannot be 0".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(RuleConfigError::InvalidAuthConfig(
                "cache_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
