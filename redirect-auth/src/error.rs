//! Error types for the `redirect-auth` crate.
//!
//! A root Error struct holding an error kind tree and an optional source for chaining.
//! Callback rejections are not errors; see `oauth::Rejection`.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for redirect-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in redirect-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Provider(ProviderErrorKind),
    Metadata(MetadataErrorKind),
    Config(ConfigErrorKind),
    Http(HttpErrorKind),
}

/// Errors from provider configuration lookups. These are operator errors.
#[derive(Debug, PartialEq)]
pub enum ProviderErrorKind {
    NotFound,
    UnsupportedStandard,
    MissingEndpoint,
    InvalidEndpoint,
}

/// Errors from OpenID discovery metadata retrieval. These are transient.
#[derive(Debug, PartialEq)]
pub enum MetadataErrorKind {
    Status(u16),
    InvalidResponse,
    MissingAuthorizationEndpoint,
    Network,
}

/// Errors from loading the authorization settings.
#[derive(Debug, PartialEq)]
pub enum ConfigErrorKind {
    Io,
    Parse,
    Invalid,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl Error {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Metadata(_) | ErrorKind::Http(HttpErrorKind::Network)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Provider(kind) => write!(f, "Provider error: {:?}", kind)?,
            ErrorKind::Metadata(kind) => write!(f, "Provider metadata error: {:?}", kind)?,
            ErrorKind::Config(kind) => write!(f, "Configuration error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create provider configuration errors.
pub fn provider_error(kind: ProviderErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Provider(kind),
    }
}

/// Helper function to create discovery metadata errors.
pub fn metadata_error(kind: MetadataErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Metadata(kind),
    }
}

/// Helper function to create settings errors.
pub fn config_error(kind: ConfigErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config(kind),
    }
}
