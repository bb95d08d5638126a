//! Entry points used by the hosting request layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use log::*;
use tokio::task::JoinHandle;
use url::Url;

use super::callback::{CallbackParams, RedirectCallbackValidator, ValidationResult};
use super::pending::{PendingAuthorizationStore, Scopes};
use super::registry::ProviderRegistry;
use super::url_builder::AuthorizationUrlBuilder;
use crate::discovery::MetadataFetcher;
use crate::error::Error;
use crate::settings::AuthorizationSettings;

/// Authorization URL together with the tokens it carries.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Authorization URL to redirect the user to.
    pub url: Url,
    /// CSRF state parameter for validation.
    pub state: String,
    /// Replay protection nonce.
    pub nonce: String,
}

/// Issues authorization URLs and validates their callbacks.
///
/// Cheap to clone; all clones share one store and one registry.
#[derive(Clone)]
pub struct AuthorizationFlow {
    store: PendingAuthorizationStore,
    registry: Arc<ProviderRegistry>,
    builder: AuthorizationUrlBuilder,
    validator: RedirectCallbackValidator,
}

impl AuthorizationFlow {
    /// Build the flow from settings. Fails on any invalid provider entry.
    pub fn new(
        settings: &AuthorizationSettings,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Result<Self, Error> {
        let registry = ProviderRegistry::from_settings(settings, fetcher)?;
        let store = PendingAuthorizationStore::with_timeout_secs(settings.authorization_timeout);
        Ok(Self::from_parts(store, Arc::new(registry), &settings.redirect_uri))
    }

    pub fn from_parts(
        store: PendingAuthorizationStore,
        registry: Arc<ProviderRegistry>,
        redirect_uri: &str,
    ) -> Self {
        Self {
            builder: AuthorizationUrlBuilder::new(registry.clone(), redirect_uri),
            validator: RedirectCallbackValidator::new(store.clone()),
            store,
            registry,
        }
    }

    pub fn store(&self) -> &PendingAuthorizationStore {
        &self.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Register a pending authorization and return the URL to send the user to.
    ///
    /// The provider endpoint is resolved before the entry is created, so any
    /// discovery fetch happens outside the store lock and a failed fetch leaves
    /// nothing behind.
    pub async fn issue_authorization_url<I, S>(
        &self,
        uid: &str,
        scopes: I,
        provider_tag: &str,
    ) -> Result<AuthorizationRequest, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry
            .resolve_authorization_endpoint(provider_tag)
            .await
            .map_err(|e| {
                error!("Cannot issue authorization URL for {}: {}", provider_tag, e);
                e
            })?;

        let pending = self
            .store
            .insert(uid, scopes.into_iter().collect::<Scopes>(), provider_tag);

        match self.builder.build(&pending).await {
            Ok(url) => {
                info!("Issued authorization URL for uid {} at provider {}", uid, provider_tag);
                Ok(AuthorizationRequest {
                    url,
                    state: pending.state,
                    nonce: pending.nonce,
                })
            }
            Err(e) => {
                error!("Failed to build authorization URL for {}: {}", provider_tag, e);
                self.store.remove_by_state(&pending.state);
                Err(e)
            }
        }
    }

    /// Validate a redirect callback from its parsed query parameters.
    pub fn handle_redirect_callback(&self, query: &HashMap<String, String>) -> ValidationResult {
        self.validator.validate(&CallbackParams::from_query(query))
    }

    /// Remove every pending authorization past its timeout.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired(Utc::now())
    }

    /// Sweep expired entries every `period` on the current tokio runtime.
    pub fn spawn_sweeper(&self, period: StdDuration) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let swept = store.sweep_expired(Utc::now());
                if swept > 0 {
                    info!("Expired {} pending authorization(s)", swept);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, MetadataErrorKind};
    use crate::oauth::callback::Rejection;
    use crate::oauth::registry::tests::{ScriptedFetcher, GOOGLE_METADATA};
    use chrono::Duration;

    const SETTINGS: &str = r#"{
        "redirect_uri": "https://app.example.com/oauth/callback",
        "authorization_timeout": 300,
        "providers": {
            "google": {
                "standard": "OpenID Connect",
                "client_id": "google-client",
                "metadata_url": "https://accounts.google.com/.well-known/openid-configuration"
            },
            "dropbox": {
                "standard": "OAuth 2.0",
                "client_id": "dropbox-client",
                "authorization_endpoint": "https://www.dropbox.com/oauth2/authorize"
            }
        }
    }"#;

    fn flow(fetcher: ScriptedFetcher) -> AuthorizationFlow {
        let settings = AuthorizationSettings::from_json_str(SETTINGS).unwrap();
        AuthorizationFlow::new(&settings, Arc::new(fetcher)).unwrap()
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_openid_end_to_end_and_replay() {
        let flow = flow(ScriptedFetcher::new(vec![ScriptedFetcher::ok(GOOGLE_METADATA)]));

        let request = flow
            .issue_authorization_url("u1", ["openid", "profile"], "google")
            .await
            .unwrap();

        assert_eq!(request.url.host_str(), Some("accounts.google.com"));
        assert_eq!(request.state.len(), 64);
        assert_eq!(request.nonce.len(), 64);
        assert!(request.state.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(request.nonce.chars().all(|c| c.is_ascii_hexdigit()));

        // Simulate the provider redirecting back with state and nonce.
        let mut callback = HashMap::new();
        callback.insert("state".to_string(), request.state.clone());
        callback.insert("nonce".to_string(), request.nonce.clone());
        callback.insert("code".to_string(), "4/0Adeu5B".to_string());

        let accepted = flow.handle_redirect_callback(&callback).unwrap();
        assert_eq!(accepted.uid, "u1");
        assert_eq!(accepted.provider_tag, "google");
        assert_eq!(accepted.scopes.iter().collect::<Vec<_>>(), ["openid", "profile"]);

        assert_eq!(
            flow.handle_redirect_callback(&callback),
            Err(Rejection::UnknownState)
        );
    }

    #[tokio::test]
    async fn test_oauth2_url_round_trips_through_callback() {
        let flow = flow(ScriptedFetcher::new(vec![]));

        let request = flow
            .issue_authorization_url("u2", ["read", "write"], "dropbox")
            .await
            .unwrap();
        assert!(request.url.as_str().contains("scope=read%20write"));

        let params = query(&request.url);
        let mut callback = HashMap::new();
        callback.insert("state".to_string(), params["state"].clone());

        assert!(flow.handle_redirect_callback(&callback).is_ok());
        assert!(flow.store().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_no_pending_entry() {
        let flow = flow(ScriptedFetcher::new(vec![ScriptedFetcher::status(500)]));

        let err = flow
            .issue_authorization_url("u1", ["openid"], "google")
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Metadata(MetadataErrorKind::Status(500))
        );
        assert!(flow.store().is_empty());
        assert!(flow.registry().cached_metadata("google").is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_leaves_no_pending_entry() {
        let flow = flow(ScriptedFetcher::new(vec![]));
        assert!(flow
            .issue_authorization_url("u1", ["read"], "github")
            .await
            .is_err());
        assert!(flow.store().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expired_removes_stale_entries() {
        let flow = flow(ScriptedFetcher::new(vec![]));
        let stale = Utc::now() - Duration::seconds(301);
        flow.store()
            .insert_at("u1", ["read"].into_iter().collect(), "dropbox", stale);
        flow.issue_authorization_url("u2", ["read"], "dropbox")
            .await
            .unwrap();

        assert_eq!(flow.sweep_expired(), 1);
        assert_eq!(flow.store().len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_expires_entries() {
        let flow = flow(ScriptedFetcher::new(vec![]));
        let stale = Utc::now() - Duration::seconds(301);
        flow.store()
            .insert_at("u1", ["read"].into_iter().collect(), "dropbox", stale);

        let handle = flow.spawn_sweeper(StdDuration::from_millis(10));
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.abort();

        assert!(flow.store().is_empty());
    }
}
