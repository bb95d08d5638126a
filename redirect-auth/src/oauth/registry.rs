//! Provider registry with cached OpenID discovery metadata.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::*;
use url::Url;

use super::provider::{ProviderConfig, ProviderEndpoint};
use crate::discovery::{DiscoveryDocument, MetadataFetcher};
use crate::error::{config_error, provider_error, ConfigErrorKind, Error, ProviderErrorKind};
use crate::settings::{duration_from_secs, AuthorizationSettings};

#[derive(Debug, Clone)]
struct CachedMetadata {
    document: DiscoveryDocument,
    fetched_at: DateTime<Utc>,
}

/// Static provider configuration plus a cache of discovery documents.
///
/// Discovery documents are fetched outside of any lock. Two concurrent first
/// fetches for one provider may both hit the network; both produce the same
/// document and the later write wins. Only validated documents are cached.
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
    metadata: DashMap<String, CachedMetadata>,
    metadata_ttl: Option<Duration>,
    fetcher: Arc<dyn MetadataFetcher>,
}

impl ProviderRegistry {
    pub fn new(
        providers: impl IntoIterator<Item = ProviderConfig>,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|config| (config.tag.clone(), config))
                .collect(),
            metadata: DashMap::new(),
            metadata_ttl: None,
            fetcher,
        }
    }

    /// Build the registry from settings, validating every provider entry.
    pub fn from_settings(
        settings: &AuthorizationSettings,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Result<Self, Error> {
        let providers = settings
            .providers
            .iter()
            .map(|(tag, raw)| ProviderConfig::from_settings(tag, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut registry = Self::new(providers, fetcher);
        if let Some(ttl_secs) = settings.metadata_ttl {
            let ttl = duration_from_secs(ttl_secs).ok_or_else(|| {
                config_error(ConfigErrorKind::Invalid, "metadata_ttl is out of range")
            })?;
            registry = registry.with_metadata_ttl(ttl);
        }
        Ok(registry)
    }

    /// Re-fetch discovery documents older than `ttl`.
    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = Some(ttl);
        self
    }

    pub fn get(&self, provider_tag: &str) -> Result<&ProviderConfig, Error> {
        self.providers.get(provider_tag).ok_or_else(|| {
            provider_error(
                ProviderErrorKind::NotFound,
                &format!("no provider configured for tag '{}'", provider_tag),
            )
        })
    }

    pub fn provider_tags(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Resolve the authorization endpoint for `provider_tag`.
    ///
    /// OAuth 2.0 providers return their configured endpoint. OpenID Connect
    /// providers return the endpoint from the discovery document, fetching
    /// and caching it on first use.
    pub async fn resolve_authorization_endpoint(&self, provider_tag: &str) -> Result<Url, Error> {
        match &self.get(provider_tag)?.endpoint {
            ProviderEndpoint::Static {
                authorization_endpoint,
                ..
            } => Ok(authorization_endpoint.clone()),
            ProviderEndpoint::Discovered { metadata_url } => {
                let document = self.discovery_document(provider_tag, metadata_url).await?;
                document.authorization_endpoint()
            }
        }
    }

    /// The cached discovery document for `provider_tag`, if present and fresh.
    pub fn cached_metadata(&self, provider_tag: &str) -> Option<DiscoveryDocument> {
        let now = Utc::now();
        self.metadata
            .get(provider_tag)
            .filter(|cached| self.is_fresh(cached, now))
            .map(|cached| cached.document.clone())
    }

    /// Drop the cached discovery document for `provider_tag`.
    pub fn invalidate_metadata(&self, provider_tag: &str) {
        if self.metadata.remove(provider_tag).is_some() {
            debug!("Invalidated cached discovery metadata for {}", provider_tag);
        }
    }

    async fn discovery_document(
        &self,
        provider_tag: &str,
        metadata_url: &Url,
    ) -> Result<DiscoveryDocument, Error> {
        if let Some(document) = self.cached_metadata(provider_tag) {
            return Ok(document);
        }

        info!("Fetching OpenID discovery metadata for {}", provider_tag);
        let response = self.fetcher.fetch(metadata_url).await?;
        let document = DiscoveryDocument::from_response(&response).map_err(|e| {
            warn!(
                "Rejected discovery metadata for {} from {}: {}",
                provider_tag, metadata_url, e
            );
            e
        })?;

        self.metadata.insert(
            provider_tag.to_string(),
            CachedMetadata {
                document: document.clone(),
                fetched_at: Utc::now(),
            },
        );
        Ok(document)
    }

    fn is_fresh(&self, cached: &CachedMetadata, now: DateTime<Utc>) -> bool {
        match self.metadata_ttl {
            Some(ttl) => now - cached.fetched_at <= ttl,
            None => true,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::discovery::FetchResponse;
    use crate::error::{metadata_error, ErrorKind, MetadataErrorKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fetcher replaying scripted responses and counting calls.
    pub(crate) struct ScriptedFetcher {
        responses: Mutex<Vec<Result<FetchResponse, Error>>>,
        pub(crate) calls: Mutex<usize>,
    }

    impl ScriptedFetcher {
        pub(crate) fn new(responses: Vec<Result<FetchResponse, Error>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        pub(crate) fn ok(body: &str) -> Result<FetchResponse, Error> {
            Ok(FetchResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })
        }

        pub(crate) fn status(status: u16) -> Result<FetchResponse, Error> {
            Ok(FetchResponse {
                status,
                body: b"{}".to_vec(),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MetadataFetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &Url) -> Result<FetchResponse, Error> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(metadata_error(MetadataErrorKind::Network, "no scripted response"));
            }
            responses.remove(0)
        }
    }

    pub(crate) const GOOGLE_METADATA: &str = r#"{
        "issuer": "https://accounts.google.com",
        "authorization_endpoint": "https://accounts.google.com/o/oauth2/v2/auth"
    }"#;

    fn google() -> ProviderConfig {
        ProviderConfig::openid_connect(
            "google",
            "google-client",
            Url::parse("https://accounts.google.com/.well-known/openid-configuration").unwrap(),
        )
    }

    fn dropbox() -> ProviderConfig {
        ProviderConfig::oauth2(
            "dropbox",
            "dropbox-client",
            Url::parse("https://www.dropbox.com/oauth2/authorize").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_oauth2_endpoint_needs_no_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let registry = ProviderRegistry::new([dropbox()], fetcher.clone());

        let endpoint = registry.resolve_authorization_endpoint("dropbox").await.unwrap();
        assert_eq!(endpoint.as_str(), "https://www.dropbox.com/oauth2/authorize");
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let registry = ProviderRegistry::new([dropbox()], Arc::new(ScriptedFetcher::new(vec![])));
        let err = registry.resolve_authorization_endpoint("github").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Provider(ProviderErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_openid_metadata_fetched_once() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![ScriptedFetcher::ok(GOOGLE_METADATA)]));
        let registry = ProviderRegistry::new([google()], fetcher.clone());

        for _ in 0..3 {
            let endpoint = registry.resolve_authorization_endpoint("google").await.unwrap();
            assert_eq!(endpoint.host_str(), Some("accounts.google.com"));
        }
        assert_eq!(fetcher.call_count(), 1);
        assert!(registry.cached_metadata("google").is_some());
    }

    #[tokio::test]
    async fn test_server_error_is_not_cached() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ScriptedFetcher::status(500),
            ScriptedFetcher::ok(GOOGLE_METADATA),
        ]));
        let registry = ProviderRegistry::new([google()], fetcher.clone());

        let err = registry.resolve_authorization_endpoint("google").await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Metadata(MetadataErrorKind::Status(500))
        );
        assert!(registry.cached_metadata("google").is_none());

        registry.resolve_authorization_endpoint("google").await.unwrap();
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_document_without_endpoint_is_not_cached() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ScriptedFetcher::ok(r#"{"issuer": "https://accounts.google.com"}"#),
            ScriptedFetcher::ok("not json"),
        ]));
        let registry = ProviderRegistry::new([google()], fetcher.clone());

        let err = registry.resolve_authorization_endpoint("google").await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Metadata(MetadataErrorKind::MissingAuthorizationEndpoint)
        );
        let err = registry.resolve_authorization_endpoint("google").await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Metadata(MetadataErrorKind::InvalidResponse)
        );
        assert!(registry.cached_metadata("google").is_none());
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(metadata_error(
            MetadataErrorKind::Network,
            "connection refused",
        ))]));
        let registry = ProviderRegistry::new([google()], fetcher);

        let err = registry.resolve_authorization_endpoint("google").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(registry.cached_metadata("google").is_none());
    }

    #[tokio::test]
    async fn test_expired_ttl_refetches() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ScriptedFetcher::ok(GOOGLE_METADATA),
            ScriptedFetcher::ok(GOOGLE_METADATA),
        ]));
        let registry = ProviderRegistry::new([google()], fetcher.clone())
            .with_metadata_ttl(Duration::seconds(-1));

        registry.resolve_authorization_endpoint("google").await.unwrap();
        registry.resolve_authorization_endpoint("google").await.unwrap();
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            ScriptedFetcher::ok(GOOGLE_METADATA),
            ScriptedFetcher::ok(GOOGLE_METADATA),
        ]));
        let registry = ProviderRegistry::new([google()], fetcher.clone());

        registry.resolve_authorization_endpoint("google").await.unwrap();
        registry.invalidate_metadata("google");
        assert!(registry.cached_metadata("google").is_none());
        registry.resolve_authorization_endpoint("google").await.unwrap();
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn test_from_settings_rejects_out_of_range_ttl() {
        let mut settings = AuthorizationSettings::from_json_str(
            r#"{ "redirect_uri": "https://app.example.com/cb" }"#,
        )
        .unwrap();
        settings.metadata_ttl = Some(u64::MAX);

        let err = ProviderRegistry::from_settings(&settings, Arc::new(ScriptedFetcher::new(vec![])))
            .err()
            .unwrap();
        assert_eq!(
            err.error_kind,
            ErrorKind::Config(ConfigErrorKind::Invalid)
        );
    }

    #[test]
    fn test_from_settings_rejects_unsupported_standard() {
        let settings = AuthorizationSettings::from_json_str(
            r#"{
                "redirect_uri": "https://app.example.com/cb",
                "providers": {
                    "corp": { "standard": "SAML 2.0", "client_id": "c" }
                }
            }"#,
        )
        .unwrap();

        let err = ProviderRegistry::from_settings(&settings, Arc::new(ScriptedFetcher::new(vec![])))
            .err()
            .unwrap();
        assert_eq!(
            err.error_kind,
            ErrorKind::Provider(ProviderErrorKind::UnsupportedStandard)
        );
        assert!(err.to_string().contains("'corp'"));
        assert!(err.to_string().contains("'SAML 2.0'"));
    }
}
