//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{Duration, Utc};
use gmail_insights::credentials::{AuthorizationFlow, Credential};
use gmail_insights::error::Result;
use gmail_insights::llm::EmailAnalyst;
use gmail_insights::mail::MailClient;
use gmail_insights::wordcloud::{Colormap, WordCloudRenderer};
use image::Rgb;
use mockall::mock;
use serde_json::json;

/// Inbox previews used across the integration tests
pub const SAMPLE_SNIPPETS: [&str; 4] = [
    "Buy cheap watches NOW!!!",
    "Meeting moved to 3pm",
    "Your invoice for the meeting room is attached",
    "Cheap flights to Lisbon: book now",
];

pub fn sample_snippets() -> Vec<String> {
    SAMPLE_SNIPPETS.iter().map(|s| s.to_string()).collect()
}

/// Credential valid for another hour
pub fn fresh_credential(access_token: &str) -> Credential {
    Credential {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
    }
}

/// Credential that expired ten minutes ago
pub fn expired_credential(access_token: &str) -> Credential {
    Credential {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Some(Utc::now() - Duration::minutes(10)),
    }
}

pub fn small_renderer() -> WordCloudRenderer {
    WordCloudRenderer::new(320, 160, 50, Rgb([0, 0, 0]), Colormap::Plasma)
}

/// Chat-completion response body carrying `content`
pub fn mock_completion_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
    })
}

/// Mail client that serves `snippets` as message ids m0..mN
pub fn mail_serving(snippets: Vec<String>) -> MockMailClient {
    let mut mail = MockMailClient::new();
    let count = snippets.len();
    mail.expect_list_message_ids()
        .returning(move |_, max| Ok((0..count.min(max as usize)).map(|i| format!("m{}", i)).collect()));
    mail.expect_get_snippet().returning(move |id| {
        let index: usize = id.trim_start_matches('m').parse().unwrap();
        Ok(snippets[index].clone())
    });
    mail
}

mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_message_ids(&self, label: &str, max_results: u32) -> Result<Vec<String>>;
        async fn get_snippet(&self, id: &str) -> Result<String>;
    }
}

mock! {
    pub Analyst {}

    #[async_trait::async_trait]
    impl EmailAnalyst for Analyst {
        async fn summarize(&self, text: &str) -> Result<String>;
        async fn analyze_sentiment(&self, text: &str) -> Result<String>;
    }
}

mock! {
    pub Flow {}

    #[async_trait::async_trait]
    impl AuthorizationFlow for Flow {
        async fn refresh(&self, refresh_token: &str) -> Result<Credential>;
        async fn authorize(&self) -> Result<Credential>;
    }
}
