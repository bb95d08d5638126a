use crate::controller::{health_check_controller, oauth_controller};
use crate::AppState;
use axum::{routing::get, Router};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(oauth_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn oauth_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/oauth/{provider}/authorize",
            get(oauth_controller::authorize),
        )
        .route("/oauth/callback", get(oauth_controller::callback))
        .with_state(app_state)
}
