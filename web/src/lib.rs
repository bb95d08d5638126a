use log::*;
use redirect_auth::oauth::AuthorizationFlow;
use service::config::Config;
use tokio::net::TcpListener;

pub use self::error::{Error, Result};

mod controller;
mod error;
pub mod router;

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub flow: AuthorizationFlow,
}

impl AppState {
    pub fn new(config: Config, flow: AuthorizationFlow) -> Self {
        Self { config, flow }
    }
}

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_address = app_state.config.listen_address();
    let listener = TcpListener::bind(&listen_address).await?;

    info!(
        "Server starting... listening for connections on http://{}",
        listen_address
    );

    axum::serve(listener, router::define_routes(app_state)).await
}
