// src/clients/serpapi.rs
//! SerpAPI Google News search client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::clients::{NewsHit, NewsSearch};
use crate::error::ClientError;

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

pub struct SerpApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
}

#[derive(Deserialize)]
struct NewsResult {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    source: Option<NewsResultSource>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
}

#[derive(Deserialize)]
struct NewsResultSource {
    #[serde(default)]
    name: Option<String>,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Result dates arrive as ISO timestamps when the engine provides them;
/// anything else is treated as undated rather than guessed at.
fn parse_result_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let normalized = raw.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[async_trait]
impl NewsSearch for SerpApiClient {
    async fn search_news(&self, query: &str) -> Result<Vec<NewsHit>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/search.json", self.base_url))
            .query(&[
                ("engine", "google_news"),
                ("q", query),
                ("gl", "us"),
                ("hl", "en"),
                ("api_key", &self.api_key),
            ])
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

        let body: SearchResponse = resp.json().await?;
        let hits = body
            .news_results
            .into_iter()
            .filter_map(|r| {
                let url = r.link.filter(|l| !l.is_empty())?;
                Some(NewsHit {
                    url,
                    title: r.title,
                    snippet: r.snippet,
                    source_name: r.source.and_then(|s| s.name),
                    published_at: r.date.as_deref().and_then(parse_result_date),
                    thumbnail: r.thumbnail,
                })
            })
            .collect();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_dates_and_rejects_prose() {
        assert!(parse_result_date("2026-02-19T07:00:00Z").is_some());
        assert!(parse_result_date("2 days ago").is_none());
    }

    #[test]
    fn results_without_links_are_dropped() {
        let json = r#"{"news_results": [
            {"title": "no link"},
            {"link": "https://a.com/x", "title": "ok", "source": {"name": "Wire"}}
        ]}"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        let hits: Vec<_> = resp
            .news_results
            .into_iter()
            .filter_map(|r| r.link.filter(|l| !l.is_empty()))
            .collect();
        assert_eq!(hits, vec!["https://a.com/x"]);
    }
}
