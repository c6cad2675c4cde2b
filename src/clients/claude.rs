// src/clients/claude.rs
//! Claude Messages API client. Requires `ANTHROPIC_API_KEY`-style credential
//! injected by the caller; callers parse the returned text themselves.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clients::{Analyst, CompletionRequest};
use crate::error::ClientError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    default_model: String,
    base_url: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_key: String, default_model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            default_model: default_model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Analyst for ClaudeClient {
    async fn complete(&self, req: CompletionRequest<'_>) -> Result<String, ClientError> {
        if self.api_key.is_empty() {
            return Err(ClientError::MissingCredential("anthropic api key"));
        }

        let body = MessagesRequest {
            model: req.model.unwrap_or(&self.default_model),
            max_tokens: req.max_tokens,
            system: req.system,
            messages: vec![Message {
                role: "user",
                content: req.user,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: message.chars().take(300).collect(),
            });
        }

        let parsed: MessagesResponse = resp.json().await?;
        let text: Vec<String> = parsed.content.into_iter().filter_map(|b| b.text).collect();
        Ok(text.join("\n").trim().to_string())
    }
}

/// Strip markdown code fencing from a model reply, leaving the payload.
/// Models wrap JSON in ```json fences despite instructions often enough
/// that every caller wants this.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn response_text_blocks_concatenate() {
        let json = r#"{"content": [{"type": "text", "text": "one"}, {"type": "text", "text": "two"}]}"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        let text: Vec<String> = resp.content.into_iter().filter_map(|b| b.text).collect();
        assert_eq!(text.join("\n"), "one\ntwo");
    }
}
