//! # Rule Engine
//!
//! Ordered, first-match evaluation of routing rules.
//!
//! ```text
//! request ──→ [prio 1] ──no──→ [prio 2] ──no──→ ... ──no──→ None (default deny)
//!                │yes              │yes
//!                ↓                 ↓
//!             rule 1            rule 2
//! ```
//!
//! Every predicate of a rule must hold for the rule to match. Rules are
//! validated and sorted once at construction and never change afterwards.

use std::fmt;

use super::error::RuleConfigError;
use super::request::Request;
use crate::auth::constant_time_compare;

/// Path matcher: an exact literal, or a prefix when the pattern ends in `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// Parse `/resource` or `/resource*`. Only a single trailing wildcard is
    /// accepted.
    pub fn parse(pattern: &str) -> Result<Self, RuleConfigError> {
        if !pattern.starts_with('/') {
            return Err(RuleConfigError::InvalidPathPattern(pattern.to_string()));
        }
        match pattern.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => {
                Err(RuleConfigError::InvalidPathPattern(pattern.to_string()))
            }
            Some(prefix) => Ok(PathPattern::Prefix(prefix.to_string())),
            None if pattern.contains('*') => {
                Err(RuleConfigError::InvalidPathPattern(pattern.to_string()))
            }
            None => Ok(PathPattern::Exact(pattern.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(literal) => path == literal,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(literal) => f.write_str(literal),
            PathPattern::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Allowed HTTP methods. A `*` entry allows any method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    Any,
    Only(Vec<String>),
}

impl MethodSet {
    pub fn from_list<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods: Vec<String> = methods.into_iter().map(Into::into).collect();
        if methods.iter().any(|m| m == "*") {
            MethodSet::Any
        } else {
            MethodSet::Only(methods)
        }
    }

    pub fn contains(&self, method: &str) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(methods) => methods.iter().any(|m| m == method),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, MethodSet::Only(methods) if methods.is_empty())
    }
}

/// A single condition of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPredicate {
    /// Header present (case-insensitive name) with exactly this value.
    HeaderEquals { name: String, value: String },
    /// Request path matches the pattern.
    Path(PathPattern),
    /// Request method is in the set.
    MethodIn(MethodSet),
}

impl MatchPredicate {
    pub fn header_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        MatchPredicate::HeaderEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn path(pattern: &str) -> Result<Self, RuleConfigError> {
        PathPattern::parse(pattern).map(MatchPredicate::Path)
    }

    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MatchPredicate::MethodIn(MethodSet::from_list(methods))
    }

    pub fn holds(&self, request: &Request) -> bool {
        match self {
            MatchPredicate::HeaderEquals { name, value } => request
                .header(name)
                .is_some_and(|actual| constant_time_compare(actual, value)),
            MatchPredicate::Path(pattern) => pattern.matches(request.path()),
            MatchPredicate::MethodIn(methods) => methods.contains(request.method()),
        }
    }
}

/// What happens to a request once its rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Forward without authentication. This is the public-path exception and
    /// is logged with the rule name every time it is taken.
    Forward,
    /// Verify the session with the auth delegate, then forward.
    AuthenticateThenForward,
    /// Answer directly.
    FixedResponse { status: http::StatusCode, body: String },
}

impl RuleAction {
    pub fn fixed_response(status: u16, body: impl Into<String>) -> Result<Self, RuleConfigError> {
        if !(100..=599).contains(&status) {
            return Err(RuleConfigError::InvalidStatus(status));
        }
        let status = http::StatusCode::from_u16(status)
            .map_err(|_| RuleConfigError::InvalidStatus(status))?;
        Ok(RuleAction::FixedResponse {
            status,
            body: body.into(),
        })
    }
}

/// A prioritised, conjunctive routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    name: String,
    priority: u32,
    predicates: Vec<MatchPredicate>,
    action: RuleAction,
}

impl Rule {
    pub fn new(name: impl Into<String>, priority: u32, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            priority,
            predicates: Vec::new(),
            action,
        }
    }

    /// Add a predicate.
    pub fn when(mut self, predicate: MatchPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn predicates(&self) -> &[MatchPredicate] {
        &self.predicates
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// True iff every predicate holds.
    pub fn matches(&self, request: &Request) -> bool {
        self.predicates.iter().all(|p| p.holds(request))
    }

    fn validate(&self) -> Result<(), RuleConfigError> {
        if self.predicates.is_empty() {
            return Err(RuleConfigError::NoPredicates(self.name.clone()));
        }
        for predicate in &self.predicates {
            match predicate {
                MatchPredicate::HeaderEquals { name, .. } if name.trim().is_empty() => {
                    return Err(RuleConfigError::EmptyHeaderName(self.name.clone()));
                }
                MatchPredicate::MethodIn(methods) if methods.is_empty() => {
                    return Err(RuleConfigError::EmptyMethodSet(self.name.clone()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Immutable, priority-ordered rule set.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Validate and sort the rules.
    ///
    /// # Errors
    ///
    /// - `DuplicatePriority` if two rules share a priority
    /// - `NoPredicates`, `EmptyHeaderName`, `EmptyMethodSet` for malformed rules
    pub fn new(mut rules: Vec<Rule>) -> Result<Self, RuleConfigError> {
        for rule in &rules {
            rule.validate()?;
        }

        rules.sort_by_key(Rule::priority);
        if let Some(pair) = rules
            .windows(2)
            .find(|pair| pair[0].priority == pair[1].priority)
        {
            return Err(RuleConfigError::DuplicatePriority {
                priority: pair[0].priority,
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }

        Ok(Self { rules })
    }

    /// First rule, in ascending priority order, whose predicates all hold.
    pub fn evaluate(&self, request: &Request) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(request))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET_HEADER: &str = "X-Origin-Secret";

    fn reference_rules() -> Vec<Rule> {
        vec![
            Rule::new("authenticated-routes", 2, RuleAction::AuthenticateThenForward)
                .when(MatchPredicate::header_equals(SECRET_HEADER, "s3cret"))
                .when(MatchPredicate::path("/*").unwrap()),
            Rule::new("public-products", 1, RuleAction::Forward)
                .when(MatchPredicate::header_equals(SECRET_HEADER, "s3cret"))
                .when(MatchPredicate::path("/products").unwrap())
                .when(MatchPredicate::methods(["GET"])),
        ]
    }

    #[test]
    fn test_path_pattern_parse() {
        assert_eq!(
            PathPattern::parse("/products").unwrap(),
            PathPattern::Exact("/products".into())
        );
        assert_eq!(
            PathPattern::parse("/orders*").unwrap(),
            PathPattern::Prefix("/orders".into())
        );
        assert!(PathPattern::parse("orders").is_err());
        assert!(PathPattern::parse("/or*ders").is_err());
        assert!(PathPattern::parse("/**").is_err());
        assert!(PathPattern::parse("").is_err());
    }

    #[test]
    fn test_path_pattern_matching() {
        let exact = PathPattern::parse("/products").unwrap();
        assert!(exact.matches("/products"));
        assert!(!exact.matches("/products/1"));

        let prefix = PathPattern::parse("/orders*").unwrap();
        assert!(prefix.matches("/orders"));
        assert!(prefix.matches("/orders/42"));
        assert!(prefix.matches("/ordersX"));
        assert!(!prefix.matches("/order"));
        assert_eq!(prefix.to_string(), "/orders*");
    }

    #[test]
    fn test_method_set() {
        let get_only = MethodSet::from_list(["GET", "HEAD"]);
        assert!(get_only.contains("GET"));
        assert!(!get_only.contains("POST"));
        assert!(MethodSet::from_list(["*"]).contains("DELETE"));
    }

    #[test]
    fn test_header_predicate_requires_presence() {
        let predicate = MatchPredicate::header_equals(SECRET_HEADER, "s3cret");
        assert!(!predicate.holds(&Request::new("GET", "/")));
        assert!(!predicate.holds(&Request::new("GET", "/").with_header(SECRET_HEADER, "S3CRET")));
        assert!(predicate.holds(&Request::new("GET", "/").with_header("x-origin-secret", "s3cret")));
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let engine = RuleEngine::new(reference_rules()).unwrap();
        let priorities: Vec<u32> = engine.rules().iter().map(Rule::priority).collect();
        assert_eq!(priorities, vec![1, 2]);
    }

    #[test]
    fn test_first_match_wins() {
        let engine = RuleEngine::new(reference_rules()).unwrap();

        let products = Request::new("GET", "/products").with_header(SECRET_HEADER, "s3cret");
        assert_eq!(engine.evaluate(&products).unwrap().name(), "public-products");

        // POST /products skips the public rule and lands on the authenticated one
        let post = Request::new("POST", "/products").with_header(SECRET_HEADER, "s3cret");
        assert_eq!(engine.evaluate(&post).unwrap().name(), "authenticated-routes");
    }

    #[test]
    fn test_missing_secret_matches_nothing() {
        let engine = RuleEngine::new(reference_rules()).unwrap();
        assert!(engine.evaluate(&Request::new("GET", "/products")).is_none());
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let rules = vec![
            Rule::new("a", 1, RuleAction::Forward).when(MatchPredicate::path("/a").unwrap()),
            Rule::new("b", 1, RuleAction::Forward).when(MatchPredicate::path("/b").unwrap()),
        ];
        assert!(matches!(
            RuleEngine::new(rules),
            Err(RuleConfigError::DuplicatePriority { priority: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_rules_rejected() {
        assert_eq!(
            RuleEngine::new(vec![Rule::new("bare", 1, RuleAction::Forward)]).unwrap_err(),
            RuleConfigError::NoPredicates("bare".into())
        );

        let empty_methods = Rule::new("m", 1, RuleAction::Forward)
            .when(MatchPredicate::methods(Vec::<String>::new()));
        assert_eq!(
            RuleEngine::new(vec![empty_methods]).unwrap_err(),
            RuleConfigError::EmptyMethodSet("m".into())
        );

        let empty_header = Rule::new("h", 1, RuleAction::Forward)
            .when(MatchPredicate::header_equals(" ", "v"));
        assert_eq!(
            RuleEngine::new(vec![empty_header]).unwrap_err(),
            RuleConfigError::EmptyHeaderName("h".into())
        );
    }

    #[test]
    fn test_fixed_response_status_validation() {
        assert!(RuleAction::fixed_response(503, "down").is_ok());
        assert_eq!(
            RuleAction::fixed_response(42, "bad").unwrap_err(),
            RuleConfigError::InvalidStatus(42)
        );
        assert!(RuleAction::fixed_response(599, "edge").is_ok());
        assert_eq!(
            RuleAction::fixed_response(700, "bad").unwrap_err(),
            RuleConfigError::InvalidStatus(700)
        );
    }

    proptest! {
        /// For unique priorities, evaluate returns the lowest-priority rule
        /// whose predicates hold, or none.
        #[test]
        fn prop_evaluate_returns_lowest_matching_priority(
            specs in proptest::collection::btree_map(0u32..1000, (0usize..4, any::<bool>()), 1..12),
            path_idx in 0usize..4,
            get in any::<bool>(),
        ) {
            let paths = ["/a", "/a/b", "/b", "/"];
            let patterns = ["/a*", "/a/b", "/b*", "/*"];

            let rules: Vec<Rule> = specs
                .iter()
                .map(|(priority, (pattern_idx, get_only))| {
                    let methods = if *get_only { vec!["GET"] } else { vec!["*"] };
                    Rule::new(format!("r{}", priority), *priority, RuleAction::Forward)
                        .when(MatchPredicate::path(patterns[*pattern_idx]).unwrap())
                        .when(MatchPredicate::methods(methods))
                })
                .collect();

            let engine = RuleEngine::new(rules.clone()).unwrap();
            let request = Request::new(if get { "GET" } else { "POST" }, paths[path_idx]);

            let expected = rules
                .iter()
                .filter(|rule| rule.matches(&request))
                .map(Rule::priority)
                .min();

            prop_assert_eq!(engine.evaluate(&request).map(Rule::priority), expected);
        }
    }
}
