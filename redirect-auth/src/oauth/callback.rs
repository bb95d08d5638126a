//! Redirect callback validation.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use log::*;
use subtle::ConstantTimeEq;

use super::pending::{PendingAuthorization, PendingAuthorizationStore};

/// Message shown to end users for every rejection.
pub const GENERIC_REJECTION_MESSAGE: &str = "authorization failed or expired";

/// Why a callback was not accepted.
///
/// Rejections are expected outcomes of untrusted input, not errors. They are
/// logged in detail but must never be shown to the end user individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The provider reported an authorization error.
    ProviderDenied,
    /// No pending entry for the state; never issued or already used.
    UnknownState,
    /// An OpenID Connect callback carried the wrong nonce.
    StateNonceMismatch,
    /// The entry was consumed after its timeout had elapsed.
    Expired,
}

impl Rejection {
    pub fn public_message(&self) -> &'static str {
        GENERIC_REJECTION_MESSAGE
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            Rejection::ProviderDenied => "provider denied authorization",
            Rejection::UnknownState => "unknown state",
            Rejection::StateNonceMismatch => "state/nonce mismatch",
            Rejection::Expired => "authorization expired",
        };
        f.write_str(reason)
    }
}

pub type ValidationResult = Result<PendingAuthorization, Rejection>;

/// Parameters of a redirect callback, already parsed from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let take = |key: &str| query.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            state: take("state"),
            nonce: take("nonce"),
            code: take("code"),
            error: take("error"),
            error_description: take("error_description"),
        }
    }
}

/// Validates callbacks against the pending authorization store.
#[derive(Clone)]
pub struct RedirectCallbackValidator {
    store: PendingAuthorizationStore,
}

impl RedirectCallbackValidator {
    pub fn new(store: PendingAuthorizationStore) -> Self {
        Self { store }
    }

    pub fn validate(&self, callback: &CallbackParams) -> ValidationResult {
        self.validate_at(callback, Utc::now())
    }

    /// Validate `callback` as of `now`.
    ///
    /// A provider error leaves the pending entry in place so the user can retry
    /// under the same state. Every other path consumes the entry first, so a
    /// replayed callback always ends in `UnknownState`.
    pub fn validate_at(&self, callback: &CallbackParams, now: DateTime<Utc>) -> ValidationResult {
        if let Some(error) = &callback.error {
            warn!(
                "Authorization callback rejected: provider returned error '{}' ({})",
                error,
                callback.error_description.as_deref().unwrap_or("no description")
            );
            return Err(Rejection::ProviderDenied);
        }

        let pending = callback
            .state
            .as_deref()
            .and_then(|state| self.store.consume_by_state_at(state, now))
            .ok_or_else(|| {
                warn!("Authorization callback rejected: unknown or reused state");
                Rejection::UnknownState
            })?;

        if pending.scopes.includes_openid() {
            let nonce_matches = callback
                .nonce
                .as_deref()
                .map(|nonce| bool::from(nonce.as_bytes().ct_eq(pending.nonce.as_bytes())))
                .unwrap_or(false);
            if !nonce_matches {
                warn!(
                    "Authorization callback rejected: nonce mismatch for uid {} at provider {}",
                    pending.uid, pending.provider_tag
                );
                return Err(Rejection::StateNonceMismatch);
            }
        }

        if pending.is_expired(now, self.store.timeout()) {
            warn!(
                "Authorization callback rejected: request for uid {} at provider {} expired",
                pending.uid, pending.provider_tag
            );
            return Err(Rejection::Expired);
        }

        info!(
            "Authorization callback accepted for uid {} at provider {}",
            pending.uid, pending.provider_tag
        );
        Ok(pending)
    }
}
