//! Anthropic Claude API client for the prompt proxy
//!
//! One request, one reply: the prompt goes out as a single user message and
//! the text blocks of the response come back joined.

use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::settings::Settings;
use crate::utils::safe_truncate;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API message format
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Anthropic API request format
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

/// Anthropic API response format
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

pub struct AiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    api_url: String,
}

impl AiClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: settings.anthropic_api_key.clone().filter(|k| !k.is_empty()),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            api_url: settings.api_url.clone(),
        }
    }

    /// Check if AI features are available (API key is set)
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a prompt and return the model's reply text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::MissingApiKey)?;

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        tracing::debug!("[AI] Prompt to {}: {}", self.model, safe_truncate(prompt, 80));

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("[AI] API error {}: {}", status, safe_truncate(&body, 200));
            return Err(AiError::Status { status, body });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

/// Pull the reply text out of a raw Messages API response body.
fn parse_response(body: &str) -> Result<String, AiError> {
    let api_response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| AiError::Malformed(format!("Failed to parse response: {}", e)))?;

    if let Some(usage) = &api_response.usage {
        tracing::info!(
            "[AI] Tokens used: {} in / {} out",
            usage.input_tokens,
            usage.output_tokens
        );
    }

    extract_text(&api_response.content)
}

fn extract_text(blocks: &[ContentBlock]) -> Result<String, AiError> {
    let text = blocks
        .iter()
        .filter(|b| b.kind.as_deref().map(|k| k == "text").unwrap_or(true))
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(AiError::Malformed("response contained no text".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "content": [{"type": "text", "text": "Photosynthesis turns light into sugar."}],
            "usage": {"input_tokens": 12, "output_tokens": 9}
        }"#;
        assert_eq!(parse_response(body).unwrap(), "Photosynthesis turns light into sugar.");
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let body = r#"{"content": [
            {"type": "text", "text": "First"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "Second"}
        ]}"#;
        assert_eq!(parse_response(body).unwrap(), "First\nSecond");
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(matches!(parse_response("not json"), Err(AiError::Malformed(_))));
        assert!(matches!(parse_response(r#"{"content": []}"#), Err(AiError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = AiClient::new(&Settings::default());
        assert!(!client.is_available());
        let err = client.generate_text("hello").await.unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey));
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let settings = Settings { anthropic_api_key: Some(String::new()), ..Settings::default() };
        assert!(!AiClient::new(&settings).is_available());
    }
}
