//! Controller for OAuth 2.0 / OpenID Connect redirect flows.
//!
//! Both endpoints are reached through browser redirects, so failures are
//! reported with bare status codes and never with internal details.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use log::*;
use redirect_auth::oauth::Scopes;
use serde::{Deserialize, Serialize};

use crate::{AppState, Error};

/// Query parameters for starting an authorization
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub uid: String,
    /// Space or comma separated scopes.
    #[serde(default)]
    pub scope: String,
}

/// Body returned for an accepted callback
#[derive(Debug, Serialize)]
pub struct CallbackAccepted {
    pub uid: String,
    pub provider: String,
    pub scopes: Scopes,
}

/// GET /oauth/{provider}/authorize
///
/// Redirects the browser to the provider's authorization endpoint.
pub async fn authorize(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("Authorization requested for uid {} at {}", params.uid, provider);

    let request = app_state
        .flow
        .issue_authorization_url(&params.uid, params.scope.split_whitespace(), &provider)
        .await?;

    Ok(Redirect::temporary(request.url.as_str()))
}

/// GET /oauth/callback
///
/// Handles the provider's redirect back after the user decided.
pub async fn callback(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, Error> {
    let pending = app_state.flow.handle_redirect_callback(&params)?;

    Ok(Json(CallbackAccepted {
        uid: pending.uid,
        provider: pending.provider_tag,
        scopes: pending.scopes,
    }))
}
