// src/discover/feed.rs
//! Syndication feed adapter: RSS 2.0 and Atom, one item per entry. Needs
//! only the source URL, no credential.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::discover::Discoverer;
use crate::error::{ClientError, DiscoverError};
use crate::model::{DiscoveredItem, Source};
use crate::text::{normalize_opt, normalize_text};

pub struct FeedAdapter {
    http: reqwest::Client,
}

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<RssCategory>,
    // quick-xml's serde deserializer strips the namespace prefix and matches
    // on the local element name only.
    #[serde(rename = "encoded", default)]
    content_encoded: Option<String>,
}

/// Categories may carry a `domain` attribute, so the text needs `$text`.
#[derive(Debug, Deserialize)]
struct RssCategory {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    content: Option<AtomText>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let parsed = OffsetDateTime::parse(ts, &Rfc2822).ok().or_else(|| {
        // Feeds love the obsolete named zones ("GMT", "UT"); retry numeric.
        let (head, zone) = ts.rsplit_once(' ')?;
        matches!(zone, "GMT" | "UT" | "UTC")
            .then(|| OffsetDateTime::parse(&format!("{head} +0000"), &Rfc2822).ok())
            .flatten()
    })?;
    let secs = parsed.to_offset(UtcOffset::UTC).unix_timestamp();
    Utc.timestamp_opt(secs, 0).single()
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Feeds routinely smuggle HTML entities into XML; scrub the common ones
/// before handing the document to the parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse a feed document, trying RSS 2.0 first and falling back to Atom.
pub fn parse_feed(raw: &str) -> Result<Vec<DiscoveredItem>, DiscoverError> {
    let xml = scrub_html_entities_for_xml(raw);

    if let Ok(rss) = from_str::<Rss>(&xml) {
        return Ok(rss_items(rss));
    }
    match from_str::<AtomFeed>(&xml) {
        Ok(feed) => Ok(atom_items(feed)),
        Err(e) => Err(DiscoverError::Service(ClientError::Parse(format!(
            "feed did not parse as RSS or Atom: {e}"
        )))),
    }
}

fn rss_items(rss: Rss) -> Vec<DiscoveredItem> {
    let feed_title = rss.channel.title.clone().unwrap_or_default();

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for entry in rss.channel.item {
        let Some(link) = entry.link.filter(|l| !l.trim().is_empty()) else {
            continue;
        };

        let tags: Vec<serde_json::Value> = entry
            .categories
            .iter()
            .filter_map(|c| c.value.clone())
            .map(serde_json::Value::String)
            .collect();

        let mut metadata = serde_json::Map::new();
        metadata.insert("feed_title".into(), feed_title.clone().into());
        metadata.insert("tags".into(), serde_json::Value::Array(tags));
        if let Some(content) = entry.content_encoded.filter(|c| !c.trim().is_empty()) {
            metadata.insert("rss_full_content".into(), content.into());
        }

        out.push(DiscoveredItem {
            url: link.trim().to_string(),
            title: normalize_opt(entry.title.as_deref()),
            snippet: normalize_opt(entry.description.as_deref()),
            author: entry.author.map(|a| normalize_text(&a)).filter(|a| !a.is_empty()),
            published_at: entry.pub_date.as_deref().and_then(parse_rfc2822),
            metadata,
        });
    }
    out
}

fn atom_items(feed: AtomFeed) -> Vec<DiscoveredItem> {
    let feed_title = feed.title.clone().unwrap_or_default();

    let mut out = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        // Prefer the alternate link, else the first href.
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .and_then(|l| l.href.clone())
            .or_else(|| entry.links.iter().find_map(|l| l.href.clone()));
        let Some(link) = link.filter(|l| !l.trim().is_empty()) else {
            continue;
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("feed_title".into(), feed_title.clone().into());
        metadata.insert("tags".into(), serde_json::Value::Array(Vec::new()));
        if let Some(content) = entry
            .content
            .and_then(|c| c.value)
            .filter(|c| !c.trim().is_empty())
        {
            metadata.insert("rss_full_content".into(), content.into());
        }

        out.push(DiscoveredItem {
            url: link.trim().to_string(),
            title: normalize_opt(entry.title.as_deref()),
            snippet: normalize_opt(entry.summary.as_deref()),
            author: entry.author.and_then(|a| a.name),
            published_at: entry
                .published
                .as_deref()
                .or(entry.updated.as_deref())
                .and_then(parse_rfc3339),
            metadata,
        });
    }
    out
}

impl FeedAdapter {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("newsdesk-research/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for FeedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discoverer for FeedAdapter {
    async fn discover(&self, source: &Source) -> Result<Vec<DiscoveredItem>, DiscoverError> {
        let url = source
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DiscoverError::Config("feed source has no URL".into()))?;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoverError::Service(ClientError::Network(e.to_string())))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoverError::Service(ClientError::Api {
                status: status.as_u16(),
                message: format!("feed fetch failed for {url}"),
            }));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| DiscoverError::Service(ClientError::Network(e.to_string())))?;

        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}
