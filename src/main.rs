use log::*;
use redirect_auth::{
    discovery::HttpMetadataFetcher, http::HttpClientConfig, oauth::AuthorizationFlow,
    settings::AuthorizationSettings,
};
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting redirect_auth_rs [{}] with providers from {}",
        config.runtime_env(),
        config.providers_file().display()
    );

    let settings = match AuthorizationSettings::from_json_file(config.providers_file())
        .and_then(|settings| {
            settings.with_overrides(
                config.redirect_uri(),
                config.authorization_timeout_secs(),
                config.metadata_ttl_secs(),
            )
        }) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load authorization settings: {e}");
            std::process::exit(1);
        }
    };

    let fetcher = match HttpMetadataFetcher::new(HttpClientConfig {
        timeout: config.http_timeout(),
        max_retries: config.http_max_retries,
        ..HttpClientConfig::default()
    }) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to build identity provider HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let flow = match AuthorizationFlow::new(&settings, Arc::new(fetcher)) {
        Ok(flow) => flow,
        Err(e) => {
            error!("Invalid provider configuration: {e}");
            std::process::exit(1);
        }
    };

    let tags: Vec<&str> = flow.registry().provider_tags().collect();
    info!("Serving OAuth providers: {}", tags.join(", "));

    let _sweeper = flow.spawn_sweeper(config.sweep_interval());

    if let Err(e) = web::init_server(web::AppState::new(config, flow)).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
