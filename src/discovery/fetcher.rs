//! HTTP fetcher for parent blog pages
//!
//! This module handles:
//! - Building the discovery HTTP client with the configured user agent
//! - GET requests for listing pages
//! - Classifying failures for logging

use crate::config::DiscoveryConfig;
use reqwest::Client;
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Non-success HTTP status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

/// Builds the HTTP client used to crawl parent blogs
///
/// # Arguments
///
/// * `config` - Discovery configuration (user agent and fetch timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &DiscoveryConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page, following redirects
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
///
/// # Returns
///
/// A FetchResult indicating success or the type of failure
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            let final_url = response.url().to_string();

            if !status.is_success() {
                return FetchResult::HttpError {
                    status_code: status.as_u16(),
                };
            }

            match response.text().await {
                Ok(body) => FetchResult::Success {
                    final_url,
                    status_code: status.as_u16(),
                    body,
                },
                Err(e) => FetchResult::NetworkError {
                    error: e.to_string(),
                },
            }
        }
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                "Connection refused".to_string()
            } else {
                e.to_string()
            };
            FetchResult::NetworkError { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&DiscoveryConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blog/"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .expect(1)
            .mount(&server)
            .await;

        let config = DiscoveryConfig {
            user_agent: "TestAgent/1.0".to_string(),
            ..DiscoveryConfig::default()
        };
        let client = build_http_client(&config).unwrap();
        let url = format!("{}/blog/", server.uri());

        match fetch_page(&client, &url).await {
            FetchResult::Success {
                body, status_code, ..
            } => {
                assert_eq!(status_code, 200);
                assert_eq!(body, "<html></html>");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).unwrap();
        let result = fetch_page(&client, &format!("{}/missing", server.uri())).await;
        assert!(matches!(result, FetchResult::HttpError { status_code: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        let client = build_http_client(&DiscoveryConfig::default()).unwrap();
        let result = fetch_page(&client, "http://127.0.0.1:9/").await;
        assert!(matches!(result, FetchResult::NetworkError { .. }));
    }
}
