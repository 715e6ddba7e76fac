//! # Auth Delegate
//!
//! Turns a session credential into an [`AuthDecision`] by asking the external
//! identity provider, with a bounded per-credential decision cache in front of
//! it.
//!
//! ## Cache rules
//!
//! - An entry is served while `now < min(inserted + ttl, decision.expires_at)`.
//!   The TTL bounds staleness; caching never extends a decision's own expiry.
//! - Negative decisions (credential refused by the provider) are cached.
//! - Provider failures are never cached, so the next request retries.
//! - The cache holds at most `cache_capacity` entries. When it is full,
//!   expired entries are purged first, then the entry closest to expiry goes.
//!
//! The cache is a [`DashMap`]: lookups for different credentials never wait
//! on each other, and no shard lock is held while the provider is called.
//! Two concurrent misses for the same credential may both reach the provider.

mod secret;

pub use secret::constant_time_compare;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{AuthConfig, AuthDecision, RouteError, VerifierError};
use crate::ports::{CredentialVerifier, TimeSource, Timestamp};

#[derive(Debug, Clone)]
struct CacheEntry {
    decision: AuthDecision,
    valid_until: Timestamp,
}

/// Credential verification with a decision cache.
pub struct AuthDelegate {
    verifier: Arc<dyn CredentialVerifier>,
    clock: Arc<dyn TimeSource>,
    cache: DashMap<String, CacheEntry>,
    cache_ttl_ms: u64,
    session_timeout_ms: u64,
    capacity: usize,
}

impl AuthDelegate {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn TimeSource>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            verifier,
            clock,
            cache: DashMap::new(),
            cache_ttl_ms: config.cache_ttl.as_millis() as u64,
            session_timeout_ms: config.session_timeout.as_millis() as u64,
            capacity: config.cache_capacity.max(1),
        }
    }

    /// Decide whether `credential` belongs to an authenticated session.
    ///
    /// # Errors
    ///
    /// `AuthProviderUnavailable` when the provider could not answer. Callers
    /// must treat this as a rejection.
    pub async fn authenticate(&self, credential: &str) -> Result<AuthDecision, RouteError> {
        let now = self.clock.now();

        if let Some(decision) = self.lookup(credential, now) {
            return Ok(decision);
        }

        let decision = match self.verifier.verify(credential).await {
            Ok(principal) => {
                let expires_at = principal
                    .expires_at
                    .unwrap_or_else(|| now.saturating_add(self.session_timeout_ms));
                AuthDecision::allow(principal.id, expires_at)
            }
            Err(VerifierError::Rejected(reason)) => {
                debug!(reason = %reason, "Credential rejected by identity provider");
                AuthDecision::deny(now.saturating_add(self.cache_ttl_ms))
            }
            Err(VerifierError::Unavailable(reason)) => {
                edge_telemetry::AUTH_PROVIDER_ERRORS.inc();
                warn!(reason = %reason, "Identity provider unavailable");
                return Err(RouteError::AuthProviderUnavailable(reason));
            }
        };

        self.store(credential, decision.clone(), now);
        Ok(decision)
    }

    /// Drop every entry that can no longer be served. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| now < entry.valid_until);
        before.saturating_sub(self.cache.len())
    }

    /// Evict one credential, e.g. after logout. Returns whether it was cached.
    pub fn invalidate(&self, credential: &str) -> bool {
        self.cache.remove(credential).is_some()
    }

    /// Number of cached decisions, including ones that expired but were not
    /// purged yet.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn lookup(&self, credential: &str, now: Timestamp) -> Option<AuthDecision> {
        let hit = self.cache.get(credential).map(|entry| {
            if now < entry.valid_until {
                Some(entry.decision.clone())
            } else {
                None
            }
        });

        match hit {
            Some(Some(decision)) => {
                edge_telemetry::AUTH_CACHE_LOOKUPS
                    .with_label_values(&["hit"])
                    .inc();
                Some(decision)
            }
            Some(None) => {
                edge_telemetry::AUTH_CACHE_LOOKUPS
                    .with_label_values(&["expired"])
                    .inc();
                self.cache
                    .remove_if(credential, |_, entry| now >= entry.valid_until);
                None
            }
            None => {
                edge_telemetry::AUTH_CACHE_LOOKUPS
                    .with_label_values(&["miss"])
                    .inc();
                None
            }
        }
    }

    fn store(&self, credential: &str, decision: AuthDecision, now: Timestamp) {
        let valid_until = now
            .saturating_add(self.cache_ttl_ms)
            .min(decision.expires_at);
        if valid_until <= now {
            return;
        }

        if self.cache.len() >= self.capacity && !self.cache.contains_key(credential) {
            self.make_room(now);
        }

        self.cache.insert(
            credential.to_string(),
            CacheEntry {
                decision,
                valid_until,
            },
        );
    }

    fn make_room(&self, now: Timestamp) {
        self.cache.retain(|_, entry| now < entry.valid_until);
        if self.cache.len() < self.capacity {
            return;
        }

        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().valid_until)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            debug!("Auth cache full, evicting entry closest to expiry");
            self.cache.remove(&key);
        }
    }
}

impl std::fmt::Debug for AuthDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDelegate")
            .field("cached", &self.cache.len())
            .field("cache_ttl_ms", &self.cache_ttl_ms)
            .field("capacity", &self.capacity)
            .finish()
    }
}
