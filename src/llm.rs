//! Language model client for email summaries and sentiment labels

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{InsightsError, Result};

/// Environment variable holding the inference API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Read the API key, failing fast when it is absent or blank
pub fn api_key_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(InsightsError::MissingApiKey(API_KEY_ENV.to_string())),
    }
}

/// Operations the shell needs from a language model
#[async_trait]
pub trait EmailAnalyst: Send + Sync {
    /// Summarize an email body
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Describe the sentiment of an email body
    async fn analyze_sentiment(&self, text: &str) -> Result<String>;
}

/// The two fixed prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Summary,
    Sentiment,
}

impl PromptKind {
    /// Build the user message from already-truncated text
    pub fn user_message(&self, text: &str) -> String {
        match self {
            PromptKind::Summary => format!("Summary:\n\n{}", text),
            PromptKind::Sentiment => format!(
                "Analyze the sentiment of the following email:\n\n{}\n\nSentiment:",
                text
            ),
        }
    }

    pub fn temperature(&self, config: &ModelConfig) -> f32 {
        match self {
            PromptKind::Summary => config.summary_temperature,
            PromptKind::Sentiment => config.sentiment_temperature,
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Chat-completion backed analyst
pub struct OpenAiAnalyst {
    client: Client<OpenAIConfig>,
    config: ModelConfig,
}

impl OpenAiAnalyst {
    pub fn new(api_key: &str, config: ModelConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.api_base.trim_end_matches('/'));

        // Failures propagate to the caller; the client must not retry on its own
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        Self {
            client: Client::with_config(openai_config).with_backoff(no_retry),
            config,
        }
    }

    /// Assemble the request for one prompt kind
    pub fn build_request(&self, kind: PromptKind, text: &str) -> Result<CreateChatCompletionRequest> {
        let truncated = truncate_chars(text, self.config.max_input_chars);

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.config.system_prompt.clone())
            .build()?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(kind.user_message(truncated))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.config.model.clone())
            .messages([system.into(), user.into()])
            .temperature(kind.temperature(&self.config))
            .max_tokens(self.config.max_tokens)
            .build()?;
        Ok(request)
    }

    async fn complete(&self, kind: PromptKind, text: &str) -> Result<String> {
        let request = self.build_request(kind, text)?;
        debug!(
            "Sending {:?} request to {} ({} input chars)",
            kind,
            self.config.model,
            text.chars().count().min(self.config.max_input_chars)
        );

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| InsightsError::ModelError("No response content from model".to_string()))
    }
}

#[async_trait]
impl EmailAnalyst for OpenAiAnalyst {
    async fn summarize(&self, text: &str) -> Result<String> {
        self.complete(PromptKind::Summary, text).await
    }

    async fn analyze_sentiment(&self, text: &str) -> Result<String> {
        self.complete(PromptKind::Sentiment, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use serial_test::serial;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    async fn analyst_for(server: &MockServer) -> OpenAiAnalyst {
        let config = ModelConfig {
            api_base: server.uri(),
            ..ModelConfig::default()
        };
        OpenAiAnalyst::new("test-key", config)
    }

    async fn sent_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_prompt_templates() {
        assert_eq!(PromptKind::Summary.user_message("body"), "Summary:\n\nbody");
        assert_eq!(
            PromptKind::Sentiment.user_message("body"),
            "Analyze the sentiment of the following email:\n\nbody\n\nSentiment:"
        );

        let config = ModelConfig::default();
        assert_eq!(PromptKind::Summary.temperature(&config), 0.5);
        assert_eq!(PromptKind::Sentiment.temperature(&config), 0.0);
    }

    #[tokio::test]
    async fn test_summarize_sends_fixed_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("  Lunch moved.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let analyst = analyst_for(&server).await;
        let summary = analyst.summarize("Lunch is moved to noon").await.unwrap();
        assert_eq!(summary, "Lunch moved.");

        let bodies = sent_bodies(&server).await;
        let body = &bodies[0];
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Let me assist you");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Summary:\n\nLunch is moved to noon");
    }

    #[tokio::test]
    async fn test_long_input_is_truncated_before_transmission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        let analyst = analyst_for(&server).await;
        let long_text = "x".repeat(5000);
        analyst.summarize(&long_text).await.unwrap();
        analyst.analyze_sentiment(&long_text).await.unwrap();

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies.len(), 2);

        let summary_prompt = bodies[0]["messages"][1]["content"].as_str().unwrap();
        let email_part = summary_prompt.trim_start_matches("Summary:\n\n");
        assert_eq!(email_part.chars().count(), 2000);

        let sentiment_prompt = bodies[1]["messages"][1]["content"].as_str().unwrap();
        assert_eq!(sentiment_prompt.matches('x').count(), 2000);
        assert!(sentiment_prompt.ends_with("\n\nSentiment:"));
        assert_eq!(bodies[1]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Invalid request",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": null
                }
            })))
            .mount(&server)
            .await;

        let analyst = analyst_for(&server).await;
        let result = analyst.analyze_sentiment("hello").await;
        assert!(matches!(result, Err(InsightsError::ModelError(_))));
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        std::env::set_var(API_KEY_ENV, "sk-test");
        assert_eq!(api_key_from_env().unwrap(), "sk-test");

        std::env::set_var(API_KEY_ENV, "   ");
        assert!(matches!(
            api_key_from_env(),
            Err(InsightsError::MissingApiKey(_))
        ));

        std::env::remove_var(API_KEY_ENV);
        let err = api_key_from_env().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "The OPENAI_API_KEY environment variable is not set."
        );
    }
}
