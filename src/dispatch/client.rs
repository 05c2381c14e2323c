//! Chat-completion clients

use crate::config::ProviderConfig;
use crate::dispatch::{DispatchError, DispatchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_TOKENS: u32 = 8000;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.95;

/// A single provider endpoint that turns a prompt pair into text
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DispatchResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// How a provider wants to be addressed
#[derive(Debug, Clone)]
enum Flavor {
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=..` with an `api-key` header
    Azure,
    /// `{endpoint}/chat/completions` with a bearer token and the model in the body
    OpenAi,
}

/// Chat-completion client for one configured provider
#[derive(Clone)]
pub struct HttpCompletionClient {
    http: Client,
    provider: String,
    url: String,
    api_key: String,
    model: String,
    flavor: Flavor,
}

impl HttpCompletionClient {
    /// Builds a client from provider configuration
    ///
    /// The reqwest timeout is set slightly above the dispatcher's call
    /// timeout so the dispatcher reports the timeout.
    pub fn from_config(config: &ProviderConfig) -> DispatchResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 5))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DispatchError::CallFailed {
                provider: config.name.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let endpoint = config.endpoint.trim_end_matches('/');
        let (url, flavor) = match &config.api_version {
            Some(version) => (
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint, config.model, version
                ),
                Flavor::Azure,
            ),
            None => (format!("{}/chat/completions", endpoint), Flavor::OpenAi),
        };

        Ok(Self {
            http,
            provider: config.name.clone(),
            url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            flavor,
        })
    }

    fn failed(&self, message: impl Into<String>) -> DispatchError {
        DispatchError::CallFailed {
            provider: self.provider.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> DispatchResult<String> {
        let request = ChatRequest {
            model: match self.flavor {
                Flavor::Azure => None,
                Flavor::OpenAi => Some(self.model.as_str()),
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };

        let builder = self.http.post(&self.url).json(&request);
        let builder = match self.flavor {
            Flavor::Azure => builder.header("api-key", &self.api_key),
            Flavor::OpenAi => builder.bearer_auth(&self.api_key),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| self.failed(format!("request error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.failed(format!("invalid response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.failed("response contained no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(endpoint: &str, api_version: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: "test".to_string(),
            endpoint: endpoint.to_string(),
            api_key: "secret".to_string(),
            model: "gpt-test".to_string(),
            api_version: api_version.map(|v| v.to_string()),
            max_concurrent_requests: 1,
            timeout_secs: 5,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn test_openai_style_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-test",
                "max_tokens": 8000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpCompletionClient::from_config(&provider(&server.uri(), None)).unwrap();
        let text = client.complete("system", "user").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_azure_style_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-test/chat/completions"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("azure")))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpCompletionClient::from_config(&provider(&server.uri(), Some("2024-02-01")))
                .unwrap();
        assert_eq!(client.complete("s", "u").await.unwrap(), "azure");
    }

    #[tokio::test]
    async fn test_error_status_is_call_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = HttpCompletionClient::from_config(&provider(&server.uri(), None)).unwrap();
        let err = client.complete("s", "u").await.unwrap_err();
        match err {
            DispatchError::CallFailed { message, .. } => assert!(message.contains("429")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_call_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = HttpCompletionClient::from_config(&provider(&server.uri(), None)).unwrap();
        assert!(matches!(
            client.complete("s", "u").await,
            Err(DispatchError::CallFailed { .. })
        ));
    }
}
