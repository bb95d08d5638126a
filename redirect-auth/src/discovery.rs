//! OpenID Connect discovery metadata retrieval.
//!
//! The registry only ever needs one outbound operation, `fetch(url)`, so it is
//! expressed as the [`MetadataFetcher`] trait. [`HttpMetadataFetcher`] is the
//! production implementation on top of the retrying HTTP client.

use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{metadata_error, Error, ErrorKind, MetadataErrorKind};
use crate::http::{HttpClient, HttpClientConfig};

/// Status code and raw body of a metadata request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound collaborator used to retrieve discovery documents.
///
/// Implementations report transport failures as `MetadataErrorKind::Network`
/// and return every HTTP response, successful or not, as a [`FetchResponse`].
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error>;
}

/// [`MetadataFetcher`] backed by `reqwest` with retry middleware.
pub struct HttpMetadataFetcher {
    client: HttpClient,
}

impl HttpMetadataFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, Error> {
        Ok(Self {
            client: config.build_json_client()?,
        })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        debug!("Fetching OpenID discovery metadata from {}", url);

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch discovery metadata from {}: {:?}", url, e);
                Error {
                    source: Some(Box::new(e)),
                    error_kind: ErrorKind::Metadata(MetadataErrorKind::Network),
                }
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read discovery metadata body from {}: {:?}", url, e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Metadata(MetadataErrorKind::Network),
            }
        })?;

        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// The subset of an OpenID provider configuration document this crate uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

impl DiscoveryDocument {
    /// Parse and validate a discovery response.
    ///
    /// A document is only returned when `authorization_endpoint` is present and
    /// is an absolute URL, so anything that reaches the cache is usable.
    pub fn from_response(response: &FetchResponse) -> Result<Self, Error> {
        if !response.is_success() {
            return Err(metadata_error(
                MetadataErrorKind::Status(response.status),
                &format!("discovery endpoint returned HTTP {}", response.status),
            ));
        }

        let value: serde_json::Value = serde_json::from_slice(&response.body).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Metadata(MetadataErrorKind::InvalidResponse),
        })?;

        if !value.is_object() {
            return Err(metadata_error(
                MetadataErrorKind::InvalidResponse,
                "discovery document is not a JSON object",
            ));
        }

        match value.get("authorization_endpoint") {
            Some(serde_json::Value::String(_)) => {}
            _ => {
                return Err(metadata_error(
                    MetadataErrorKind::MissingAuthorizationEndpoint,
                    "discovery document has no authorization_endpoint",
                ))
            }
        }

        let document: DiscoveryDocument = serde_json::from_value(value).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Metadata(MetadataErrorKind::InvalidResponse),
        })?;

        document.authorization_endpoint()?;
        Ok(document)
    }

    /// The authorization endpoint as a parsed URL.
    pub fn authorization_endpoint(&self) -> Result<Url, Error> {
        Url::parse(&self.authorization_endpoint).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Metadata(MetadataErrorKind::InvalidResponse),
        })
    }
}
