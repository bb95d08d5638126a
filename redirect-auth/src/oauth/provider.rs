//! Provider configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::error::{provider_error, Error, ErrorKind, ProviderErrorKind};
use crate::settings::ProviderSettings;

/// Authorization standard a provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderStandard {
    OAuth2,
    OpenIdConnect,
}

impl ProviderStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStandard::OAuth2 => "OAuth 2.0",
            ProviderStandard::OpenIdConnect => "OpenID Connect",
        }
    }
}

impl fmt::Display for ProviderStandard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnsupportedStandard(pub String);

impl FromStr for ProviderStandard {
    type Err = UnsupportedStandard;

    fn from_str(standard: &str) -> Result<Self, Self::Err> {
        match standard.trim().to_lowercase().as_str() {
            "oauth 2.0" | "oauth2" | "oauth 2" => Ok(ProviderStandard::OAuth2),
            "openid connect" | "openidconnect" | "oidc" => Ok(ProviderStandard::OpenIdConnect),
            _ => Err(UnsupportedStandard(standard.to_string())),
        }
    }
}

/// Where a provider's authorization endpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEndpoint {
    /// OAuth 2.0: endpoint and extra query parameters are configured directly.
    Static {
        authorization_endpoint: Url,
        additional_params: BTreeMap<String, String>,
    },
    /// OpenID Connect: endpoint is read from the discovery document.
    Discovered { metadata_url: Url },
}

/// Static configuration of one identity provider. Read-only after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub tag: String,
    pub client_id: String,
    pub endpoint: ProviderEndpoint,
}

impl ProviderConfig {
    /// An OAuth 2.0 provider with a fixed authorization endpoint.
    pub fn oauth2(tag: &str, client_id: &str, authorization_endpoint: Url) -> Self {
        Self {
            tag: tag.to_string(),
            client_id: client_id.to_string(),
            endpoint: ProviderEndpoint::Static {
                authorization_endpoint,
                additional_params: BTreeMap::new(),
            },
        }
    }

    /// An OpenID Connect provider resolved through its discovery document.
    pub fn openid_connect(tag: &str, client_id: &str, metadata_url: Url) -> Self {
        Self {
            tag: tag.to_string(),
            client_id: client_id.to_string(),
            endpoint: ProviderEndpoint::Discovered { metadata_url },
        }
    }

    /// Add an extra authorization query parameter. Only OAuth 2.0 providers carry them.
    pub fn with_additional_param(mut self, key: &str, value: &str) -> Self {
        if let ProviderEndpoint::Static {
            additional_params, ..
        } = &mut self.endpoint
        {
            additional_params.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn standard(&self) -> ProviderStandard {
        match self.endpoint {
            ProviderEndpoint::Static { .. } => ProviderStandard::OAuth2,
            ProviderEndpoint::Discovered { .. } => ProviderStandard::OpenIdConnect,
        }
    }

    /// Validate a raw settings entry into a typed configuration.
    ///
    /// Fails with `UnsupportedStandard` naming the tag and the offending
    /// standard, or with `MissingEndpoint` / `InvalidEndpoint` when the URL
    /// required by the standard is absent or unparsable.
    pub fn from_settings(tag: &str, settings: &ProviderSettings) -> Result<Self, Error> {
        let standard: ProviderStandard = settings.standard.parse().map_err(|_| {
            provider_error(
                ProviderErrorKind::UnsupportedStandard,
                &format!(
                    "provider '{}' uses unsupported standard '{}'",
                    tag, settings.standard
                ),
            )
        })?;

        let endpoint = match standard {
            ProviderStandard::OAuth2 => ProviderEndpoint::Static {
                authorization_endpoint: required_url(
                    tag,
                    "authorization_endpoint",
                    settings.authorization_endpoint.as_deref(),
                )?,
                additional_params: settings.additional_params.clone(),
            },
            ProviderStandard::OpenIdConnect => ProviderEndpoint::Discovered {
                metadata_url: required_url(tag, "metadata_url", settings.metadata_url.as_deref())?,
            },
        };

        Ok(Self {
            tag: tag.to_string(),
            client_id: settings.client_id.clone(),
            endpoint,
        })
    }
}

fn required_url(tag: &str, field: &str, value: Option<&str>) -> Result<Url, Error> {
    let value = value.ok_or_else(|| {
        provider_error(
            ProviderErrorKind::MissingEndpoint,
            &format!("provider '{}' is missing {}", tag, field),
        )
    })?;

    Url::parse(value).map_err(|e| Error {
        source: Some(format!("provider '{}' has an invalid {}: {}", tag, field, e).into()),
        error_kind: ErrorKind::Provider(ProviderErrorKind::InvalidEndpoint),
    })
}
