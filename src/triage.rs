// src/triage.rs
//! LLM triage of pending items: classify discovered URLs as relevant news,
//! maybe, or not-news before spending scraping budget on enrichment, and
//! recover publish dates the adapters couldn't see.
//!
//! Fail-open by design — any failure (no analyst, API error, unparseable
//! reply) degrades the affected items to `Maybe` so the heuristic pipeline
//! still runs. Data-report and house-content items skip triage entirely:
//! the former are already model-curated, the latter never reach scoring.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::clients::{claude::strip_code_fences, Analyst, CompletionRequest};
use crate::model::{DiscoveredItem, Publication, SourceKind};

const TRIAGE_MAX_TOKENS: u32 = 4096;
const SNIPPET_TRUNCATE: usize = 300;

pub fn skips_triage(kind: SourceKind) -> bool {
    matches!(kind, SourceKind::DataReport | SourceKind::HouseContent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    RelevantNews,
    Maybe,
    NotNews,
}

impl Verdict {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "relevant_news" => Some(Verdict::RelevantNews),
            "maybe" => Some(Verdict::Maybe),
            "not_news" => Some(Verdict::NotNews),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::RelevantNews => "relevant_news",
            Verdict::Maybe => "maybe",
            Verdict::NotNews => "not_news",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriageResult {
    pub verdict: Verdict,
    pub reasoning: String,
    /// Publish date the model inferred from the URL/title/snippet, if any.
    pub published_at: Option<DateTime<Utc>>,
}

impl TriageResult {
    fn fallback(reasoning: &str) -> Self {
        Self {
            verdict: Verdict::Maybe,
            reasoning: reasoning.to_string(),
            published_at: None,
        }
    }
}

/// Classify items in batches. Returns one result per input item, in order.
pub async fn triage_items(
    analyst: &dyn Analyst,
    publication: &Publication,
    items: &[(&DiscoveredItem, SourceKind)],
    model: Option<&str>,
    batch_size: usize,
) -> Vec<TriageResult> {
    if items.is_empty() {
        return Vec::new();
    }

    let system = build_system_prompt(publication);
    let batch_size = batch_size.max(1);

    let mut results = Vec::with_capacity(items.len());
    for batch in items.chunks(batch_size) {
        let user = build_user_message(batch);
        let reply = analyst
            .complete(CompletionRequest {
                system: Some(&system),
                user: &user,
                model,
                max_tokens: TRIAGE_MAX_TOKENS,
            })
            .await;

        match reply {
            Ok(text) => results.extend(parse_verdicts(&text, batch.len())),
            Err(e) => {
                tracing::warn!(error = %e, "triage batch failed, falling back to maybe");
                results.extend((0..batch.len()).map(|_| TriageResult::fallback("triage fallback")));
            }
        }
    }
    results
}

fn build_system_prompt(publication: &Publication) -> String {
    format!(
        "You are a news triage agent for a trade publication. Your job is to classify \
         discovered URLs as relevant news articles or not, and to extract publish dates.\n\n\
         ## Publication Industry\n{industry}\n\n\
         ## Reader Personas\n{personas}\n\n\
         ## Classification Rules\n\
         For each item, assign one verdict:\n\
         - **relevant_news**: Clearly a news article, report, or analysis relevant to the publication's industry and readers, published within the last 90 days.\n\
         - **maybe**: Could be relevant but unclear from title/snippet alone. Includes opinion pieces, tangentially related topics, or ambiguous titles.\n\
         - **not_news**: Navigation pages, event listings, subscription pages, author bios, category archives, \
         tag pages, search results, login pages, content clearly unrelated to the industry, \
         OR articles/press releases older than 90 days.\n\n\
         ## Date Extraction\n\
         For each item, extract the publish date if you can determine it from the URL path \
         (e.g. /2025/02/19/), the title, or the snippet. Return the date as an ISO string \
         (YYYY-MM-DD) or null if unknown. Items with dates older than 90 days should be \
         classified as not_news.\n\n\
         ## Instructions\n\
         - Analyze the title, snippet, URL pattern, and source type for each item.\n\
         - Respond with a JSON array of objects, one per item, in the same order as the input.\n\
         - Each object must have: index (int), verdict (string), reasoning (brief string), published_date (string YYYY-MM-DD or null).\n\
         - Output ONLY the JSON array, no markdown fencing or extra text.",
        industry = publication
            .topic_description
            .as_deref()
            .unwrap_or("Not specified"),
        personas = publication
            .reader_personas
            .as_deref()
            .unwrap_or("Not specified"),
    )
}

fn build_user_message(batch: &[(&DiscoveredItem, SourceKind)]) -> String {
    let payload: Vec<serde_json::Value> = batch
        .iter()
        .enumerate()
        .map(|(i, (item, kind))| {
            let snippet: String = item
                .snippet
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(SNIPPET_TRUNCATE)
                .collect();
            serde_json::json!({
                "index": i,
                "url": item.url,
                "title": item.title.as_deref().unwrap_or_default(),
                "snippet": snippet,
                "source_type": kind.as_str(),
            })
        })
        .collect();
    serde_json::to_string(&payload).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    index: Option<usize>,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

static RE_JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").unwrap());

/// Parse the model reply into one result per item. Anything that doesn't
/// parse, or any item the reply skipped, becomes a `Maybe`.
fn parse_verdicts(reply: &str, expected: usize) -> Vec<TriageResult> {
    let fallback = |reason: &str| -> Vec<TriageResult> {
        (0..expected).map(|_| TriageResult::fallback(reason)).collect()
    };

    let text = strip_code_fences(reply);
    if text.is_empty() {
        return fallback("triage reply was empty");
    }

    let parsed: Option<Vec<serde_json::Value>> = serde_json::from_str(&text).ok().or_else(|| {
        // Recover a JSON array embedded in surrounding prose.
        RE_JSON_ARRAY
            .find(&text)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    });
    let Some(raw_values) = parsed else {
        tracing::warn!("triage reply contained no JSON array");
        return fallback("parse fallback");
    };

    let mut by_index: std::collections::HashMap<usize, RawVerdict> = raw_values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawVerdict>(v).ok())
        .filter_map(|v| v.index.map(|i| (i, v)))
        .collect();

    (0..expected)
        .map(|i| {
            let Some(raw) = by_index.remove(&i) else {
                return TriageResult::fallback("no verdict for item");
            };
            let verdict = raw
                .verdict
                .as_deref()
                .and_then(Verdict::parse)
                .unwrap_or(Verdict::Maybe);
            TriageResult {
                verdict,
                reasoning: raw
                    .reasoning
                    .unwrap_or_else(|| "no reasoning provided".to_string()),
                published_at: raw.published_date.as_deref().and_then(parse_triage_date),
            }
        })
        .collect()
}

fn parse_triage_date(raw: &str) -> Option<DateTime<Utc>> {
    let d = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::ClientError;

    struct CannedAnalyst {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl Analyst for CannedAnalyst {
        async fn complete(&self, _req: CompletionRequest<'_>) -> Result<String, ClientError> {
            self.reply
                .clone()
                .map_err(|_| ClientError::Network("down".into()))
        }
    }

    fn publication() -> Publication {
        Publication {
            id: 1,
            name: "Grain Wire".into(),
            domain: None,
            topic_description: Some("grain markets and exports".into()),
            reader_personas: Some("traders".into()),
            active: true,
            last_research_run: None,
            require_review: false,
            research_api_key: None,
        }
    }

    fn item(url: &str) -> DiscoveredItem {
        DiscoveredItem::new(url)
    }

    #[tokio::test]
    async fn maps_verdicts_by_index() {
        let analyst = CannedAnalyst {
            reply: Ok(r#"[
                {"index": 1, "verdict": "not_news", "reasoning": "tag page", "published_date": null},
                {"index": 0, "verdict": "relevant_news", "reasoning": "export story", "published_date": "2026-02-19"}
            ]"#
            .to_string()),
        };
        let items = [item("https://a.com/one"), item("https://a.com/tags")];
        let refs: Vec<(&DiscoveredItem, SourceKind)> = items
            .iter()
            .map(|i| (i, SourceKind::NewsSite))
            .collect();

        let results = triage_items(&analyst, &publication(), &refs, None, 40).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].verdict, Verdict::RelevantNews);
        assert!(results[0].published_at.is_some());
        assert_eq!(results[1].verdict, Verdict::NotNews);
    }

    #[tokio::test]
    async fn fenced_reply_still_parses() {
        let analyst = CannedAnalyst {
            reply: Ok("```json\n[{\"index\": 0, \"verdict\": \"maybe\", \"reasoning\": \"thin\"}]\n```".into()),
        };
        let items = [item("https://a.com/x")];
        let refs: Vec<(&DiscoveredItem, SourceKind)> =
            items.iter().map(|i| (i, SourceKind::RssFeed)).collect();

        let results = triage_items(&analyst, &publication(), &refs, None, 40).await;
        assert_eq!(results[0].verdict, Verdict::Maybe);
    }

    #[tokio::test]
    async fn api_failure_degrades_to_maybe() {
        let analyst = CannedAnalyst { reply: Err(()) };
        let items = [item("https://a.com/x"), item("https://a.com/y")];
        let refs: Vec<(&DiscoveredItem, SourceKind)> =
            items.iter().map(|i| (i, SourceKind::NewsSite)).collect();

        let results = triage_items(&analyst, &publication(), &refs, None, 40).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.verdict == Verdict::Maybe));
    }

    #[test]
    fn prose_wrapped_array_is_recovered() {
        let reply = "Here are my verdicts:\n[{\"index\": 0, \"verdict\": \"not_news\", \"reasoning\": \"login page\"}]\nDone.";
        let results = parse_verdicts(reply, 1);
        assert_eq!(results[0].verdict, Verdict::NotNews);
    }

    #[test]
    fn unknown_verdicts_and_missing_items_become_maybe() {
        let reply = r#"[{"index": 0, "verdict": "amazing_news", "reasoning": "?"}]"#;
        let results = parse_verdicts(reply, 2);
        assert_eq!(results[0].verdict, Verdict::Maybe);
        assert_eq!(results[1].verdict, Verdict::Maybe);
        assert_eq!(results[1].reasoning, "no verdict for item");
    }

    #[test]
    fn report_and_house_kinds_skip() {
        assert!(skips_triage(SourceKind::DataReport));
        assert!(skips_triage(SourceKind::HouseContent));
        assert!(!skips_triage(SourceKind::RssFeed));
    }
}
