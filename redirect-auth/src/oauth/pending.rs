//! Pending authorization tracking.
//!
//! Every issued authorization URL leaves one [`PendingAuthorization`] behind,
//! indexed by its `state` and its `nonce`. Callbacks consume entries exactly
//! once; entries that never see a callback are swept after the timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::Serialize;

use crate::nonce::NonceGenerator;
use crate::settings::duration_from_secs;

/// Ordered, duplicate-free list of requested scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scopes(Vec<String>);

impl Scopes {
    pub const OPENID: &'static str = "openid";

    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// True when the request asks for an OpenID Connect ID token.
    pub fn includes_openid(&self) -> bool {
        self.contains(Self::OPENID)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-separated form used for the `scope` query parameter.
    pub fn to_query_value(&self) -> String {
        self.0.join(" ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for Scopes {
    /// Entries containing commas are split on them; blanks and repeats are dropped.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut scopes: Vec<String> = Vec::new();
        for entry in iter {
            for scope in entry.as_ref().split(',').map(str::trim) {
                if !scope.is_empty() && !scopes.iter().any(|s| s == scope) {
                    scopes.push(scope.to_string());
                }
            }
        }
        Self(scopes)
    }
}

/// One outstanding authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAuthorization {
    /// Caller-supplied identifier of the end user or session.
    pub uid: String,
    /// Correlation token echoed back by the provider.
    pub state: String,
    /// Replay protection token bound into the ID token.
    pub nonce: String,
    pub scopes: Scopes,
    pub provider_tag: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// True once more than `timeout` has elapsed since creation.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.created_at > timeout
    }
}

#[derive(Debug, Default)]
struct Indexes {
    by_state: HashMap<String, PendingAuthorization>,
    state_by_nonce: HashMap<String, String>,
    /// Tokens of consumed or swept entries, with the time they were retired.
    retired: HashMap<String, DateTime<Utc>>,
}

impl Indexes {
    fn is_taken(&self, token: &str) -> bool {
        self.by_state.contains_key(token)
            || self.state_by_nonce.contains_key(token)
            || self.retired.contains_key(token)
    }

    fn remove(&mut self, state: &str, now: DateTime<Utc>) -> Option<PendingAuthorization> {
        let pending = self.by_state.remove(state)?;
        self.state_by_nonce.remove(&pending.nonce);
        self.retired.insert(pending.state.clone(), now);
        self.retired.insert(pending.nonce.clone(), now);
        Some(pending)
    }

    fn prune_retired(&mut self, now: DateTime<Utc>, window: Duration) {
        self.retired.retain(|_, retired_at| now - *retired_at <= window);
    }
}

/// Store of pending authorizations, shared by handle.
///
/// One mutex guards both indexes. It is held only while the maps are read or
/// mutated, never across I/O.
#[derive(Clone)]
pub struct PendingAuthorizationStore {
    indexes: Arc<Mutex<Indexes>>,
    generator: NonceGenerator,
    timeout: Duration,
    retired_window: Duration,
}

impl PendingAuthorizationStore {
    /// Create a store whose entries expire after `timeout`.
    ///
    /// Retired tokens are remembered for the same duration.
    pub fn new(timeout: Duration) -> Self {
        Self {
            indexes: Arc::new(Mutex::new(Indexes::default())),
            generator: NonceGenerator::new(),
            timeout,
            retired_window: timeout,
        }
    }

    /// Create a store with a timeout given in seconds.
    ///
    /// Values too large for a `Duration` are treated as never expiring.
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        Self::new(duration_from_secs(timeout_secs).unwrap_or(Duration::MAX))
    }

    /// Set how long tokens of consumed or swept entries stay unavailable for reuse.
    pub fn with_retired_window(mut self, window: Duration) -> Self {
        self.retired_window = window;
        self
    }

    /// Use a custom token generator.
    pub fn with_generator(mut self, generator: NonceGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a pending authorization with fresh `state` and `nonce` tokens.
    pub fn insert(&self, uid: &str, scopes: Scopes, provider_tag: &str) -> PendingAuthorization {
        self.insert_at(uid, scopes, provider_tag, Utc::now())
    }

    /// Create a pending authorization as of `now`.
    ///
    /// Token generation and insertion happen under one lock acquisition, so two
    /// concurrent callers can never both claim the same token. Generation is
    /// retried until a token is free; collisions at 32 random bytes do not
    /// happen in practice, so the loop has no upper bound.
    pub fn insert_at(
        &self,
        uid: &str,
        scopes: Scopes,
        provider_tag: &str,
        now: DateTime<Utc>,
    ) -> PendingAuthorization {
        let mut indexes = self.lock();
        indexes.prune_retired(now, self.retired_window);

        let state = self.fresh_token(&indexes, None);
        let nonce = self.fresh_token(&indexes, Some(&state));

        let pending = PendingAuthorization {
            uid: uid.to_string(),
            state: state.clone(),
            nonce: nonce.clone(),
            scopes,
            provider_tag: provider_tag.to_string(),
            created_at: now,
        };

        indexes.state_by_nonce.insert(nonce, state.clone());
        indexes.by_state.insert(state, pending.clone());

        debug!(
            "Registered pending authorization for provider {} ({} pending)",
            provider_tag,
            indexes.by_state.len()
        );
        pending
    }

    /// Look up and remove the entry matching `state`.
    ///
    /// Returns `None` when no such entry is pending, whether it never existed,
    /// was already consumed, or was swept. Expired entries that have not been
    /// swept yet are still returned; judging expiry is up to the caller.
    pub fn consume_by_state(&self, state: &str) -> Option<PendingAuthorization> {
        self.consume_by_state_at(state, Utc::now())
    }

    /// Consume as of `now`; the entry's tokens are retired at `now`.
    pub fn consume_by_state_at(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Option<PendingAuthorization> {
        self.lock().remove(state, now)
    }

    /// Remove the entry matching `state` without it having been used.
    pub fn remove_by_state(&self, state: &str) -> Option<PendingAuthorization> {
        self.consume_by_state(state)
    }

    /// Look up the state belonging to a pending `nonce`.
    pub fn state_for_nonce(&self, nonce: &str) -> Option<String> {
        self.lock().state_by_nonce.get(nonce).cloned()
    }

    pub fn contains_state(&self, state: &str) -> bool {
        self.lock().by_state.contains_key(state)
    }

    /// Remove every entry older than the timeout. Returns how many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut indexes = self.lock();

        let expired: Vec<String> = indexes
            .by_state
            .values()
            .filter(|pending| pending.is_expired(now, self.timeout))
            .map(|pending| pending.state.clone())
            .collect();

        for state in &expired {
            indexes.remove(state, now);
        }
        indexes.prune_retired(now, self.retired_window);

        if !expired.is_empty() {
            debug!("Swept {} expired pending authorization(s)", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().by_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn is_taken(&self, token: &str) -> bool {
        self.lock().is_taken(token)
    }

    fn fresh_token(&self, indexes: &Indexes, also_taken: Option<&str>) -> String {
        loop {
            let token = self.generator.generate();
            if !indexes.is_taken(&token) && also_taken != Some(token.as_str()) {
                return token;
            }
            warn!("Generated token collided with a pending or retired token, regenerating");
        }
    }

    // Mutations never leave the indexes half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Indexes> {
        self.indexes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
