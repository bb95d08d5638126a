//! OAuth 2.0 / OpenID Connect authorization request tracking.
//!
//! Issues authorization URLs carrying single-use `state` and `nonce` tokens and
//! validates the redirect callbacks that come back.

mod callback;
mod flow;
mod pending;
mod provider;
mod registry;
mod url_builder;

pub use callback::{
    CallbackParams, RedirectCallbackValidator, Rejection, ValidationResult,
    GENERIC_REJECTION_MESSAGE,
};
pub use flow::{AuthorizationFlow, AuthorizationRequest};
pub use pending::{PendingAuthorization, PendingAuthorizationStore, Scopes};
pub use provider::{ProviderConfig, ProviderEndpoint, ProviderStandard};
pub use registry::ProviderRegistry;
pub use url_builder::AuthorizationUrlBuilder;
