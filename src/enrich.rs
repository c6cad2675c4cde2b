// src/enrich.rs
//! Discovery-time content capture: fetch full article content while the
//! candidate is being created so drafting doesn't need a second crawl.
//! Enrichment never fails a candidate — failures are recorded in metadata
//! and the item persists without content.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::clients::PageMapper;
use crate::model::Metadata;
use crate::url_dates;

/// Schemes that should never be sent to the scraper.
const SKIP_SCHEMES: &[&str] = &["mailto", "tel", "javascript", "data", "about"];

/// Social platforms: scraping them yields login walls, not articles.
const SKIP_DOMAINS: &[&str] = &[
    "facebook.com",
    "www.facebook.com",
    "twitter.com",
    "www.twitter.com",
    "x.com",
    "www.x.com",
    "instagram.com",
    "www.instagram.com",
    "linkedin.com",
    "www.linkedin.com",
    "tiktok.com",
    "www.tiktok.com",
    "youtube.com",
    "www.youtube.com",
];

/// Path patterns that indicate listing/navigation pages, not articles.
static SKIP_PATH_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)/page/\d+$|-npage-\d+|/tag/|/category/|/author/|/search|/archive/|/events?(/|$)|/member(/|$)|/subscribe|/issue/|sitemap\.xml",
    )
    .unwrap()
});

/// Paths that are ONLY a date with no article slug after:
/// `/2024/october`, `/2019/may-6-2019` — but not `/2026/january/actual-slug`.
static DATE_ONLY_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)/\d{4}/(?:\d{1,2}|january|february|march|april|may|june|july|august|september|october|november|december)(?:-\d{1,2}-\d{4})?/?$",
    )
    .unwrap()
});

/// Does this URL look like an article worth a scrape call? Filters nav
/// pages, pagination, archives, social media, non-document file types, and
/// the source's own listing page.
pub fn is_scrapable_url(url: &str, source_url: Option<&str>) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    if SKIP_SCHEMES.contains(&parsed.scheme()) {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if SKIP_DOMAINS.contains(&host.to_lowercase().as_str()) {
        return false;
    }

    let path = parsed.path().trim_end_matches('/').to_string();
    let lower_path = path.to_lowercase();
    if lower_path.ends_with(".pdf")
        || lower_path.ends_with(".xml")
        || lower_path.ends_with(".json")
        || lower_path.ends_with(".csv")
    {
        return false;
    }

    if path.is_empty() {
        return false;
    }
    if url.ends_with('#') || url.ends_with("#content") {
        return false;
    }

    if SKIP_PATH_PATTERNS.is_match(&path) || DATE_ONLY_PATH.is_match(&path) {
        return false;
    }

    // Single-segment paths are only plausible articles when the slug is long
    // enough to be a URL-ified title (`/statement-on-stb-decision`), not a
    // nav label (`/publications`).
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 && segments.last().map_or(0, |s| s.len()) < 16 {
        return false;
    }

    if let Some(source_url) = source_url {
        if let Ok(source_parsed) = Url::parse(source_url) {
            if path == source_parsed.path().trim_end_matches('/') {
                return false;
            }
        }
    }

    true
}

/// What an enrichment attempt did, for run accounting. Free enrichments
/// (content already carried by the feed) don't count against the scrape
/// budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Enriched { free: bool },
    Failed { used_network: bool },
}

fn record_success(metadata: &mut Metadata, content: String, format: &str, source: &str) {
    metadata.insert("content_length".into(), (content.len() as i64).into());
    metadata.insert("full_content".into(), content.into());
    metadata.insert("content_format".into(), format.into());
    metadata.insert("content_source".into(), source.into());
    metadata.insert("enriched_at".into(), Utc::now().to_rfc3339().into());
    metadata.insert("enrichment_failed".into(), false.into());
    metadata.insert("enrichment_error".into(), serde_json::Value::Null);
}

fn record_failure(metadata: &mut Metadata, error: String, used_network: bool) -> EnrichOutcome {
    metadata.insert("enrichment_failed".into(), true.into());
    metadata.insert("enrichment_error".into(), error.into());
    EnrichOutcome::Failed { used_network }
}

/// Enrich one candidate-to-be. Feed-carried content is promoted for free;
/// everything else goes through the page scraper.
pub async fn enrich_item(
    mapper: &dyn PageMapper,
    url: &str,
    metadata: &mut Metadata,
    source_url: Option<&str>,
) -> EnrichOutcome {
    // Feed content available for free — promote it.
    if let Some(content) = metadata
        .get("rss_full_content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
    {
        record_success(metadata, content, "rss_html", "rss_feed");
        return EnrichOutcome::Enriched { free: true };
    }

    if !is_scrapable_url(url, source_url) {
        return record_failure(metadata, format!("URL not scrapable: {url}"), false);
    }

    match mapper.scrape_page(url).await {
        Ok(page) => {
            if page.markdown.trim().is_empty() {
                return record_failure(metadata, "scrape returned no content".into(), true);
            }

            if let Some(published) = extract_publish_date(&page.metadata, Utc::now())
                .or_else(|| url_dates::date_from_url(url))
            {
                metadata.insert(
                    "extracted_published_date".into(),
                    published.to_rfc3339().into(),
                );
            }

            record_success(metadata, page.markdown, "markdown", "scrape");
            EnrichOutcome::Enriched { free: false }
        }
        Err(e) => record_failure(metadata, e.to_string(), true),
    }
}

/// Page-metadata publish date, trying the most reliable fields first.
/// Sanity-checked: not in the future, not older than two years.
fn extract_publish_date(
    page_metadata: &serde_json::Map<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    const DATE_FIELDS: &[&str] = &[
        "publishedTime",
        "article:published_time",
        "ogArticle:published_time",
        "modifiedTime",
        "article:modified_time",
    ];

    for field in DATE_FIELDS {
        let Some(raw) = page_metadata.get(*field).and_then(|v| v.as_str()) else {
            continue;
        };
        let Ok(dt) = DateTime::parse_from_rfc3339(raw.trim()) else {
            continue;
        };
        let dt = dt.with_timezone(&Utc);
        if dt <= now && (now - dt).num_days() < 730 {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MappedLink, ScrapedPage};
    use crate::error::ClientError;
    use async_trait::async_trait;

    #[test]
    fn article_paths_are_scrapable() {
        assert!(is_scrapable_url(
            "https://site.com/2026/01/15/corn-exports-surge",
            None
        ));
        assert!(is_scrapable_url(
            "https://site.com/statement-on-stb-decision",
            None
        ));
        assert!(is_scrapable_url("https://site.com/markets/corn", None));
    }

    #[test]
    fn nav_and_listing_paths_are_not() {
        assert!(!is_scrapable_url("https://site.com/news/page/8", None));
        assert!(!is_scrapable_url("https://site.com/tag/corn/", None));
        assert!(!is_scrapable_url("https://site.com/category/markets", None));
        assert!(!is_scrapable_url("https://site.com/events/", None));
        assert!(!is_scrapable_url("https://site.com/2024/october", None));
        assert!(!is_scrapable_url("https://site.com/publications", None));
        assert!(!is_scrapable_url("https://site.com/", None));
    }

    #[test]
    fn files_social_and_schemes_are_filtered() {
        assert!(!is_scrapable_url("https://site.com/report.pdf", None));
        assert!(!is_scrapable_url("https://www.facebook.com/somepage/posts", None));
        assert!(!is_scrapable_url("mailto:editor@site.com", None));
    }

    #[test]
    fn source_listing_page_is_filtered() {
        assert!(!is_scrapable_url(
            "https://site.com/news/",
            Some("https://site.com/news")
        ));
        assert!(is_scrapable_url(
            "https://site.com/news/corn-exports-hit-record",
            Some("https://site.com/news")
        ));
    }

    struct FakeMapper {
        page: Result<ScrapedPage, ()>,
    }

    #[async_trait]
    impl PageMapper for FakeMapper {
        async fn map_links(
            &self,
            _url: &str,
            _search: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<MappedLink>, ClientError> {
            unimplemented!("not used by enrichment")
        }

        async fn scrape_links(&self, _url: &str) -> Result<Vec<String>, ClientError> {
            unimplemented!("not used by enrichment")
        }

        async fn scrape_page(&self, _url: &str) -> Result<ScrapedPage, ClientError> {
            self.page
                .clone()
                .map_err(|_| ClientError::Network("scrape down".into()))
        }
    }

    #[tokio::test]
    async fn feed_content_is_promoted_for_free() {
        let mapper = FakeMapper { page: Err(()) };
        let mut metadata = Metadata::new();
        metadata.insert("rss_full_content".into(), "<p>full story</p>".into());

        let outcome = enrich_item(
            &mapper,
            "https://site.com/markets/corn-rally",
            &mut metadata,
            None,
        )
        .await;

        assert_eq!(outcome, EnrichOutcome::Enriched { free: true });
        assert_eq!(
            metadata.get("content_source").and_then(|v| v.as_str()),
            Some("rss_feed")
        );
    }

    #[tokio::test]
    async fn scrape_failure_is_recorded_not_raised() {
        let mapper = FakeMapper { page: Err(()) };
        let mut metadata = Metadata::new();

        let outcome = enrich_item(
            &mapper,
            "https://site.com/markets/corn-rally",
            &mut metadata,
            None,
        )
        .await;

        assert_eq!(outcome, EnrichOutcome::Failed { used_network: true });
        assert_eq!(
            metadata.get("enrichment_failed").and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[tokio::test]
    async fn successful_scrape_captures_content_and_date() {
        let mut page_meta = serde_json::Map::new();
        let recent = (Utc::now() - chrono::Duration::days(3)).to_rfc3339();
        page_meta.insert("publishedTime".into(), recent.into());

        let mapper = FakeMapper {
            page: Ok(ScrapedPage {
                markdown: "# Corn rally\n\nPrices jumped.".into(),
                metadata: page_meta,
            }),
        };
        let mut metadata = Metadata::new();

        let outcome = enrich_item(
            &mapper,
            "https://site.com/markets/corn-rally",
            &mut metadata,
            None,
        )
        .await;

        assert_eq!(outcome, EnrichOutcome::Enriched { free: false });
        assert!(metadata.contains_key("full_content"));
        assert!(metadata.contains_key("extracted_published_date"));
    }

    #[test]
    fn stale_page_dates_are_rejected() {
        let now = Utc::now();
        let mut meta = serde_json::Map::new();
        meta.insert(
            "publishedTime".into(),
            (now - chrono::Duration::days(900)).to_rfc3339().into(),
        );
        assert!(extract_publish_date(&meta, now).is_none());
    }
}
