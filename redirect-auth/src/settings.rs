//! Authorization settings loaded once at startup.
//!
//! The providers file is JSON:
//!
//! ```json
//! {
//!   "redirect_uri": "https://app.example.com/oauth/callback",
//!   "authorization_timeout": 300,
//!   "providers": {
//!     "google": {
//!       "standard": "OpenID Connect",
//!       "client_id": "abc.apps.googleusercontent.com",
//!       "metadata_url": "https://accounts.google.com/.well-known/openid-configuration"
//!     },
//!     "dropbox": {
//!       "standard": "OAuth 2.0",
//!       "client_id": "xyz",
//!       "authorization_endpoint": "https://www.dropbox.com/oauth2/authorize",
//!       "additional_params": { "token_access_type": "offline" }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Duration;
use log::*;
use serde::Deserialize;

use crate::error::{config_error, ConfigErrorKind, Error};

/// Seconds a pending authorization waits for its callback when not configured.
pub const DEFAULT_AUTHORIZATION_TIMEOUT_SECS: u64 = 300;

/// Convert a configured number of seconds into a duration.
///
/// Returns `None` when the value exceeds what `chrono::Duration` can hold,
/// about 292 million years.
pub fn duration_from_secs(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

fn default_authorization_timeout() -> u64 {
    DEFAULT_AUTHORIZATION_TIMEOUT_SECS
}

/// Global authorization settings plus one entry per provider tag.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationSettings {
    /// Redirect URI registered with every provider.
    pub redirect_uri: String,
    /// Seconds before a pending authorization expires.
    #[serde(default = "default_authorization_timeout")]
    pub authorization_timeout: u64,
    /// Seconds a discovery document stays cached. Unset caches for the process lifetime.
    #[serde(default)]
    pub metadata_ttl: Option<u64>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Raw provider entry as written in the settings file.
///
/// `standard` is kept as text here so an unsupported value can be reported
/// together with the provider tag it belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub standard: String,
    pub client_id: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub additional_params: BTreeMap<String, String>,
}

impl AuthorizationSettings {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let settings: AuthorizationSettings = serde_json::from_str(json).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::ErrorKind::Config(ConfigErrorKind::Parse),
        })?;
        settings.check()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading authorization settings from {}", path.display());

        let contents = fs::read_to_string(path).map_err(|e| {
            warn!("Failed to read {}: {:?}", path.display(), e);
            Error {
                source: Some(Box::new(e)),
                error_kind: crate::ErrorKind::Config(ConfigErrorKind::Io),
            }
        })?;

        let settings = Self::from_json_str(&contents)?;
        info!(
            "Loaded {} OAuth provider(s) from {}",
            settings.providers.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Apply command line or environment overrides and re-validate.
    pub fn with_overrides(
        mut self,
        redirect_uri: Option<String>,
        authorization_timeout: Option<u64>,
        metadata_ttl: Option<u64>,
    ) -> Result<Self, Error> {
        if let Some(redirect_uri) = redirect_uri {
            self.redirect_uri = redirect_uri;
        }
        if let Some(timeout) = authorization_timeout {
            self.authorization_timeout = timeout;
        }
        if metadata_ttl.is_some() {
            self.metadata_ttl = metadata_ttl;
        }
        self.check()?;
        Ok(self)
    }

    fn check(&self) -> Result<(), Error> {
        if self.redirect_uri.trim().is_empty() {
            return Err(config_error(
                ConfigErrorKind::Invalid,
                "redirect_uri must not be empty",
            ));
        }
        if self.authorization_timeout == 0 {
            return Err(config_error(
                ConfigErrorKind::Invalid,
                "authorization_timeout must be at least one second",
            ));
        }
        if duration_from_secs(self.authorization_timeout).is_none() {
            return Err(config_error(
                ConfigErrorKind::Invalid,
                "authorization_timeout is out of range",
            ));
        }
        if self.metadata_ttl.is_some_and(|ttl| duration_from_secs(ttl).is_none()) {
            return Err(config_error(
                ConfigErrorKind::Invalid,
                "metadata_ttl is out of range",
            ));
        }
        Ok(())
    }
}
