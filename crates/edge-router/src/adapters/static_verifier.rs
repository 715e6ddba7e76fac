//! In-process credential verifier backed by a fixed session table.
//!
//! Used by development deployments (sessions come from `[auth.static_sessions]`)
//! and by tests, which can also switch the provider "down" and count calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::domain::VerifierError;
use crate::ports::{CredentialVerifier, Timestamp, VerifiedPrincipal};

#[derive(Debug, Clone)]
struct Session {
    principal: String,
    expires_at: Option<Timestamp>,
}

/// Verifier with a static credential → principal table.
#[derive(Debug)]
pub struct StaticCredentialVerifier {
    sessions: HashMap<String, Session>,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl Default for StaticCredentialVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCredentialVerifier {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Build from a credential → principal map.
    pub fn from_sessions<I, K, V>(sessions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        sessions
            .into_iter()
            .fold(Self::new(), |verifier, (credential, principal)| {
                verifier.with_session(credential, principal)
            })
    }

    /// Accept `credential` as `principal`. The delegate applies its configured
    /// session timeout.
    pub fn with_session(mut self, credential: impl Into<String>, principal: impl Into<String>) -> Self {
        self.sessions.insert(
            credential.into(),
            Session {
                principal: principal.into(),
                expires_at: None,
            },
        );
        self
    }

    /// Accept `credential` as `principal` until `expires_at`.
    pub fn with_expiring_session(
        mut self,
        credential: impl Into<String>,
        principal: impl Into<String>,
        expires_at: Timestamp,
    ) -> Self {
        self.sessions.insert(
            credential.into(),
            Session {
                principal: principal.into(),
                expires_at: Some(expires_at),
            },
        );
        self
    }

    /// Simulate a provider outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `verify` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedPrincipal, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(VerifierError::Unavailable("static verifier offline".into()));
        }

        match self.sessions.get(credential) {
            Some(session) => {
                let principal = VerifiedPrincipal::new(session.principal.clone());
                Ok(match session.expires_at {
                    Some(at) => principal.expiring_at(at),
                    None => principal,
                })
            }
            None => Err(VerifierError::Rejected("unknown session".into())),
        }
    }
}
