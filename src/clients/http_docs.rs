// src/clients/http_docs.rs
//! Plain HTTP document access: HEAD probes for URL-pattern discovery, byte
//! downloads for extraction, JSON fetches for listing APIs.

use std::time::Duration;

use async_trait::async_trait;

use crate::clients::DocumentFetcher;
use crate::error::ClientError;

pub struct HttpDocumentFetcher {
    http: reqwest::Client,
}

impl HttpDocumentFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpDocumentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn probe(&self, url: &str) -> Result<Option<String>, ClientError> {
        let resp = self
            .http
            .head(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Some(content_type))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: format!("download failed for {url}"),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, ClientError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: format!("listing fetch failed for {url}"),
            });
        }
        Ok(resp.json().await?)
    }
}
