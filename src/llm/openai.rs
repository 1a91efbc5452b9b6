//! OpenAI-compatible chat completion client

use super::{ChatModel, Completion, LlmError, PromptTemplate, TokenUsage};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the chat client
#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_backoff: Duration,
    pub temperature: f32,
    /// Reserved response tokens, sent as `max_tokens`
    pub max_tokens: Option<usize>,
}

impl Default for ChatModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

impl ChatModelConfig {
    /// Build from the provider table; the key comes from the provider's env var
    pub fn from_config(config: &Config, provider: &str, model: &str) -> Result<Self> {
        let provider_config = config
            .llm
            .provider(provider)
            .ok_or_else(|| {
                PipelineError::configuration(format!("unknown provider: {}", provider))
            })?;
        let model_config = provider_config.model(model).ok_or_else(|| {
            PipelineError::configuration(format!(
                "unknown model {} for provider {}",
                model, provider
            ))
        })?;

        Ok(Self {
            base_url: provider_config.url.clone(),
            api_key: provider_config.api_key(),
            model: model.to_string(),
            timeout: config.llm.timeout(),
            max_retries: config.llm.max_retries,
            retry_backoff: config.llm.retry_backoff(),
            temperature: config.llm.temperature,
            max_tokens: Some(model_config.response_token_limit),
        })
    }
}

/// Chat model served over an OpenAI-compatible HTTP API
pub struct OpenAiChatModel {
    client: Client,
    config: ChatModelConfig,
    prompt: PromptTemplate,
}

impl OpenAiChatModel {
    pub fn new(
        config: ChatModelConfig,
        prompt: PromptTemplate,
    ) -> std::result::Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Initialization(e.to_string()))?;

        Ok(Self {
            client,
            config,
            prompt,
        })
    }

    pub fn config(&self) -> &ChatModelConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> std::result::Result<Completion, Attempt> {
        let mut req = self.client.post(self.endpoint()).json(request);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req
            .send()
            .await
            .map_err(|e| Attempt::Retry(LlmError::Network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = LlmError::Api(format!("HTTP {}: {}", status, body));
            return Err(if is_retryable(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fatal(err)
            });
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| Attempt::Fatal(LlmError::InvalidResponse(e.to_string())))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            Attempt::Fatal(LlmError::InvalidResponse("No choices in response".to_string()))
        })?;

        Ok(Completion {
            text: choice.message.content,
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

/// Outcome of a failed attempt
enum Attempt {
    Retry(LlmError),
    Fatal(LlmError),
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn prompt_template(&self) -> &PromptTemplate {
        &self.prompt
    }

    async fn invoke(
        &self,
        context: &str,
        query: &str,
    ) -> std::result::Result<Completion, LlmError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.prompt.render(context, query),
            }],
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
        };

        // Retry logic
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff * 2u32.saturating_pow(attempt as u32 - 1);
                debug!("Retry attempt {} for {} in {:?}", attempt, self.config.model, backoff);
                tokio::time::sleep(backoff).await;
            }

            match self.send(&request).await {
                Ok(completion) => return Ok(completion),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    warn!("Model call attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Api("no attempts made".to_string())))
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsageBlock>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(url: &str, max_retries: usize) -> OpenAiChatModel {
        let config = ChatModelConfig {
            base_url: url.to_string(),
            api_key: Some(SecretString::new("sk-test".to_string())),
            model: "gpt-4".to_string(),
            max_retries,
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let prompt = PromptTemplate::new("Context: {context}\nQuestion: {query}").unwrap();
        OpenAiChatModel::new(config, prompt).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "Context: pods\nQuestion: what is a pod?"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"A pod is a group of containers."}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":8,"total_tokens":20}}"#,
            )
            .create_async()
            .await;

        let model = client_for(&server.url(), 0);
        let completion = model.invoke("pods", "what is a pod?").await.unwrap();

        assert_eq!(completion.text, "A pod is a group of containers.");
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 8
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let model = client_for(&server.url(), 2);
        let result = model.invoke("", "hello").await;

        assert!(matches!(result, Err(LlmError::Api(msg)) if msg.contains("503")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .expect(1)
            .create_async()
            .await;

        let model = client_for(&server.url(), 3);
        assert!(model.invoke("", "hello").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let model = client_for(&server.url(), 0);
        let result = model.invoke("", "hello").await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_config_from_provider_table() {
        let config = Config::default();
        let chat = ChatModelConfig::from_config(&config, "openai", "gpt-4").unwrap();
        assert_eq!(chat.base_url, "https://api.openai.com/v1");
        assert_eq!(chat.max_tokens, Some(512));
        assert!(ChatModelConfig::from_config(&config, "openai", "davinci").is_err());
    }
}
