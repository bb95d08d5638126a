//! # redirect-auth
//!
//! Tracks in-flight OAuth 2.0 / OpenID Connect authorization requests:
//! - Unguessable per-request `state` and `nonce` tokens
//! - Provider configuration and cached OpenID discovery metadata
//! - Authorization URL construction per provider standard
//! - Single-use validation of redirect callbacks
//!
//! ## Architecture
//!
//! Everything hangs off one [`oauth::AuthorizationFlow`], built once at startup
//! and shared by handle with the hosting request layer:
//! - `oauth::PendingAuthorizationStore` owns the only shared mutable state
//! - `oauth::ProviderRegistry` resolves authorization endpoints, fetching
//!   discovery documents through a `discovery::MetadataFetcher`
//! - `oauth::RedirectCallbackValidator` consumes pending entries exactly once
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redirect_auth::{
//!     discovery::HttpMetadataFetcher,
//!     http::HttpClientConfig,
//!     oauth::AuthorizationFlow,
//!     settings::AuthorizationSettings,
//! };
//!
//! let settings = AuthorizationSettings::from_json_file("providers.json")?;
//! let fetcher = HttpMetadataFetcher::new(HttpClientConfig::default())?;
//! let flow = AuthorizationFlow::new(&settings, Arc::new(fetcher))?;
//!
//! let request = flow
//!     .issue_authorization_url("user-1", ["openid", "email"], "google")
//!     .await?;
//! ```

pub mod discovery;
pub mod error;
pub mod http;
pub mod nonce;
pub mod oauth;
pub mod settings;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
