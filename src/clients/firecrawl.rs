// src/clients/firecrawl.rs
//! Firecrawl client: `/map` for site link discovery, `/scrape` for link
//! fallback and full markdown capture.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::clients::{MappedLink, PageMapper, ScrapedPage};
use crate::error::ClientError;

const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v1";

pub struct FirecrawlClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct MapRequest<'a> {
    url: &'a str,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

/// `/map` returns either bare URL strings or link objects depending on plan.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapLink {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

#[derive(Deserialize)]
struct MapResponse {
    #[serde(default)]
    links: Vec<MapLink>,
}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: &'a [&'a str],
}

#[derive(Deserialize, Default)]
struct ScrapeData {
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    data: Option<ScrapeData>,
}

impl FirecrawlClient {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint (local stub, proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post<B: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
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
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl PageMapper for FirecrawlClient {
    async fn map_links(
        &self,
        url: &str,
        search: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MappedLink>, ClientError> {
        let resp: MapResponse = self.post("/map", &MapRequest { url, limit, search }).await?;
        let links = resp
            .links
            .into_iter()
            .map(|l| match l {
                MapLink::Url(url) => MappedLink {
                    url,
                    title: None,
                    description: None,
                },
                MapLink::Detailed {
                    url,
                    title,
                    description,
                } => MappedLink {
                    url,
                    title,
                    description,
                },
            })
            .filter(|l| !l.url.is_empty())
            .collect();
        Ok(links)
    }

    async fn scrape_links(&self, url: &str) -> Result<Vec<String>, ClientError> {
        let resp: ScrapeResponse = self
            .post(
                "/scrape",
                &ScrapeRequest {
                    url,
                    formats: &["links"],
                },
            )
            .await?;
        Ok(resp.data.unwrap_or_default().links)
    }

    async fn scrape_page(&self, url: &str) -> Result<ScrapedPage, ClientError> {
        let resp: ScrapeResponse = self
            .post(
                "/scrape",
                &ScrapeRequest {
                    url,
                    formats: &["markdown"],
                },
            )
            .await?;
        let data = resp.data.unwrap_or_default();
        let markdown = data
            .markdown
            .ok_or_else(|| ClientError::Parse("scrape returned no markdown".into()))?;
        Ok(ScrapedPage {
            markdown,
            metadata: data.metadata,
        })
    }
}
