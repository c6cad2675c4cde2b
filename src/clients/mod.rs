// src/clients/mod.rs
//! External collaborators behind capability traits so the pipeline and the
//! adapters can be exercised against mocks. One reqwest implementation per
//! service: Firecrawl (link discovery/scraping), SerpAPI (news search),
//! Apache Tika (text extraction), Claude (analysis), plus a plain HTTP
//! fetcher for document probing and downloads.

pub mod claude;
pub mod firecrawl;
pub mod http_docs;
pub mod serpapi;
pub mod tika;

pub use claude::ClaudeClient;
pub use firecrawl::FirecrawlClient;
pub use http_docs::HttpDocumentFetcher;
pub use serpapi::SerpApiClient;
pub use tika::TikaClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ClientError;

/// A link discovered by mapping a site.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedLink {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A scraped page: markdown body plus whatever page metadata came back
/// (OG tags, published time, ...).
#[derive(Debug, Clone, Default)]
pub struct ScrapedPage {
    pub markdown: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Link-discovery capability.
#[async_trait]
pub trait PageMapper: Send + Sync {
    /// Enumerate links under a site URL, optionally narrowed by a search
    /// term, bounded by `limit`.
    async fn map_links(
        &self,
        url: &str,
        search: Option<&str>,
        limit: u32,
    ) -> Result<Vec<MappedLink>, ClientError>;

    /// Fallback discovery: scrape the rendered page for bare links.
    async fn scrape_links(&self, url: &str) -> Result<Vec<String>, ClientError>;

    /// Full markdown scrape with page metadata.
    async fn scrape_page(&self, url: &str) -> Result<ScrapedPage, ClientError>;
}

/// One hit from the news-search service.
#[derive(Debug, Clone, Default)]
pub struct NewsHit {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
}

#[async_trait]
pub trait NewsSearch: Send + Sync {
    async fn search_news(&self, query: &str) -> Result<Vec<NewsHit>, ClientError>;
}

/// Document text extraction: bytes in, body + table text out.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, ClientError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: Option<&'a str>,
    pub user: &'a str,
    /// Per-call model override; the client's default otherwise.
    pub model: Option<&'a str>,
    pub max_tokens: u32,
}

/// Language-model analysis capability. Returns raw completion text; callers
/// judge JSON conformance so a malformed reply stays scoped to one document.
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn complete(&self, req: CompletionRequest<'_>) -> Result<String, ClientError>;
}

/// Plain-HTTP document access for the report adapter.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// HEAD probe. `Some(content_type)` when the URL answers 2xx.
    async fn probe(&self, url: &str) -> Result<Option<String>, ClientError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError>;

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, ClientError>;
}

/// Stand-in for a capability whose credential is not configured. Every call
/// fails with `MissingCredential`, which surfaces as a per-source error
/// instead of failing startup.
pub struct Disabled(pub &'static str);

#[async_trait]
impl PageMapper for Disabled {
    async fn map_links(
        &self,
        _url: &str,
        _search: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<MappedLink>, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }

    async fn scrape_links(&self, _url: &str) -> Result<Vec<String>, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }

    async fn scrape_page(&self, _url: &str) -> Result<ScrapedPage, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }
}

#[async_trait]
impl NewsSearch for Disabled {
    async fn search_news(&self, _query: &str) -> Result<Vec<NewsHit>, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }
}

#[async_trait]
impl TextExtractor for Disabled {
    async fn extract_text(&self, _bytes: &[u8]) -> Result<String, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }
}

#[async_trait]
impl Analyst for Disabled {
    async fn complete(&self, _req: CompletionRequest<'_>) -> Result<String, ClientError> {
        Err(ClientError::MissingCredential(self.0))
    }
}
