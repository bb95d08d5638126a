//! Retrying HTTP client for identity provider requests.

mod retry;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;

pub use retry::BackoffPolicy;

/// HTTP client with middleware.
pub type HttpClient = reqwest_middleware::ClientWithMiddleware;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    /// Retries after the first attempt on transient failures.
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: format!("redirect-auth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Build a client that asks for JSON on every request and retries
    /// transient failures with [`BackoffPolicy`].
    pub fn build_json_client(&self) -> Result<HttpClient, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(
                BackoffPolicy::new(self.max_retries),
            ))
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_identifies_crate() {
        let config = HttpClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.starts_with("redirect-auth/"));
    }

    #[tokio::test]
    async fn test_json_client_sends_accept_and_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("accept", "application/json")
            .match_header("user-agent", "discovery-test")
            .with_status(204)
            .create_async()
            .await;

        let config = HttpClientConfig {
            user_agent: "discovery-test".to_string(),
            max_retries: 0,
            ..HttpClientConfig::default()
        };
        let response = config
            .build_json_client()
            .unwrap()
            .get(server.url())
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 204);
        mock.assert_async().await;
    }
}
