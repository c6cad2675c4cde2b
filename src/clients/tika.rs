// src/clients/tika.rs
//! Apache Tika server client for document text extraction. Tika flattens
//! body and table content into one plain-text stream, which is what the
//! analysis prompt consumes anyway.

use std::time::Duration;

use async_trait::async_trait;

use crate::clients::TextExtractor;
use crate::error::ClientError;

pub struct TikaClient {
    http: reqwest::Client,
    base_url: String,
}

impl TikaClient {
    /// `base_url` is the Tika server root, e.g. `http://localhost:9998`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TextExtractor for TikaClient {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, ClientError> {
        let resp = self
            .http
            .put(format!("{}/tika", self.base_url))
            .header("Accept", "text/plain")
            .body(bytes.to_vec())
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
        Ok(resp.text().await?)
    }
}
