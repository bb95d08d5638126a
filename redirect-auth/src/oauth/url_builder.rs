//! Authorization URL construction.

use std::sync::Arc;

use log::*;
use url::Url;

use super::pending::PendingAuthorization;
use super::provider::ProviderEndpoint;
use super::registry::ProviderRegistry;
use crate::error::Error;

/// Parameters the builder always sets; provider extras may not override them.
const RESERVED_PARAMS: [&str; 6] = [
    "state",
    "nonce",
    "redirect_uri",
    "client_id",
    "response_type",
    "scope",
];

/// Ordered query string builder. Keys and values are percent-encoded one by one,
/// spaces as `%20`.
#[derive(Debug, Default)]
struct QueryBuilder {
    pairs: Vec<(String, String)>,
}

impl QueryBuilder {
    fn push(&mut self, key: &str, value: &str) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append the encoded pairs to `endpoint`, keeping any query it already has.
    fn apply_to(&self, mut endpoint: Url) -> Url {
        let encoded = self.encode();
        let query = match endpoint.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
            _ => encoded,
        };
        endpoint.set_query(Some(&query));
        endpoint
    }
}

/// Builds provider-specific authorization URLs for pending authorizations.
#[derive(Clone)]
pub struct AuthorizationUrlBuilder {
    registry: Arc<ProviderRegistry>,
    redirect_uri: String,
}

impl AuthorizationUrlBuilder {
    pub fn new(registry: Arc<ProviderRegistry>, redirect_uri: &str) -> Self {
        Self {
            registry,
            redirect_uri: redirect_uri.to_string(),
        }
    }

    /// Build the URL the end user is redirected to.
    ///
    /// May fetch and cache the provider's discovery document on first use.
    pub async fn build(&self, pending: &PendingAuthorization) -> Result<Url, Error> {
        let provider = self.registry.get(&pending.provider_tag)?;
        let endpoint = self
            .registry
            .resolve_authorization_endpoint(&pending.provider_tag)
            .await?;

        let mut query = QueryBuilder::default();
        query
            .push("state", &pending.state)
            .push("nonce", &pending.nonce)
            .push("redirect_uri", &self.redirect_uri)
            .push("client_id", &provider.client_id)
            .push("response_type", "code");
        if !pending.scopes.is_empty() {
            query.push("scope", &pending.scopes.to_query_value());
        }

        match &provider.endpoint {
            ProviderEndpoint::Static {
                additional_params, ..
            } => {
                for (key, value) in additional_params {
                    if RESERVED_PARAMS.contains(&key.as_str()) {
                        warn!(
                            "Ignoring additional parameter '{}' for provider {}: it is set by the authorization request",
                            key, provider.tag
                        );
                        continue;
                    }
                    query.push(key, value);
                }
            }
            ProviderEndpoint::Discovered { .. } => {
                query
                    .push("access_type", "offline")
                    .push("prompt", "consent");
            }
        }

        Ok(query.apply_to(endpoint))
    }
}
