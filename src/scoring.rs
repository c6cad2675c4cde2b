// src/scoring.rs
//! Heuristic relevance scoring for discovered items.
//!
//! Three components, each stored alongside the composite:
//! - keyword (0–100): share of the publication/source term set found in the
//!   item's title+snippet text,
//! - recency (0–100): step function of item age in days,
//! - source weight (0–1): trust table lookup by source kind.
//!
//! Composite = keyword*0.50 + recency*0.30 + weight*100*0.20. The weighting
//! favors topical fit over freshness over source trust and is fixed —
//! downstream ranking and the strong/moderate/weak bands depend on it.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{DiscoveredItem, Publication, ScoreBreakdown, Source};
use crate::source_weights::SourceWeights;

const KEYWORD_WEIGHT: f64 = 0.50;
const RECENCY_WEIGHT: f64 = 0.30;
const SOURCE_WEIGHT: f64 = 0.20;

/// Recency score for items with no usable timestamp.
pub const NO_DATE_RECENCY: f64 = 40.0;

static RE_TERMS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]{3,}").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "has", "have", "been", "from", "with", "they", "this", "that", "will", "each", "which",
    "their", "about", "would", "there", "these", "other", "into", "more", "some",
];

/// Extract meaningful terms: lowercased alphabetic words of length >= 3 with
/// stop words removed. Duplicates are kept; callers collapse to a set.
fn extract_terms(text: &str) -> Vec<String> {
    RE_TERMS
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Keyword score 0–100. Neutral 50 when no terms are configured.
pub fn keyword_score(
    title: Option<&str>,
    snippet: Option<&str>,
    topic_description: &str,
    source_keywords: &str,
) -> f64 {
    let mut terms = extract_terms(topic_description);
    terms.extend(extract_terms(source_keywords));
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return 50.0;
    }

    let text = format!(
        "{} {}",
        title.unwrap_or_default(),
        snippet.unwrap_or_default()
    )
    .to_lowercase();

    let matches = terms.iter().filter(|t| text.contains(t.as_str())).count();
    ((matches as f64 / terms.len() as f64) * 100.0).min(100.0)
}

/// Recency score 0–100: a step function of age in (fractional) days.
/// An item exactly one day old scores 85, exactly 29 days old scores 5.
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return NO_DATE_RECENCY;
    };

    let days = (now - published).num_seconds() as f64 / 86_400.0;
    if days < 1.0 {
        100.0
    } else if days < 2.0 {
        85.0
    } else if days < 4.0 {
        70.0
    } else if days < 8.0 {
        50.0
    } else if days < 15.0 {
        30.0
    } else if days < 29.0 {
        15.0
    } else {
        5.0
    }
}

/// Composite 0–100 from the three stored components.
pub fn composite(keyword: f64, recency: f64, source_weight: f64) -> f64 {
    round2(keyword * KEYWORD_WEIGHT + recency * RECENCY_WEIGHT + source_weight * 100.0 * SOURCE_WEIGHT)
}

/// Score one item against its source and publication.
pub fn score_item(
    item: &DiscoveredItem,
    source: &Source,
    publication: &Publication,
    weights: &SourceWeights,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let kw = keyword_score(
        item.title.as_deref(),
        item.snippet.as_deref(),
        publication.topic_description.as_deref().unwrap_or(""),
        source.keywords.as_deref().unwrap_or(""),
    );
    let rec = recency_score(item.published_at, now);
    let weight = weights.weight_for(source.kind);

    ScoreBreakdown {
        keyword: round2(kw),
        recency: round2(rec),
        source_weight: round2(weight),
        relevance: composite(kw, rec, weight),
    }
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn keyword_neutral_when_unconfigured() {
        assert_eq!(keyword_score(Some("anything"), None, "", ""), 50.0);
    }

    #[test]
    fn keyword_counts_distinct_terms() {
        // Terms: {corn, exports, brazil, soybean} — 2 of 4 matched.
        let score = keyword_score(
            Some("Corn exports surge"),
            Some("corn again"),
            "corn exports",
            "brazil soybean",
        );
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_ignores_stop_words_and_short_tokens() {
        // "the" and "us" contribute no terms; only "weather" counts.
        let score = keyword_score(Some("weather report"), None, "the us weather", "");
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn recency_steps() {
        let n = now();
        let at = |d: i64, s: i64| Some(n - Duration::days(d) - Duration::seconds(s));
        assert_eq!(recency_score(at(0, 3600), n), 100.0);
        assert_eq!(recency_score(at(1, 1), n), 85.0);
        assert_eq!(recency_score(at(3, 0), n), 70.0);
        assert_eq!(recency_score(at(7, 0), n), 50.0);
        assert_eq!(recency_score(at(14, 0), n), 30.0);
        assert_eq!(recency_score(at(28, 0), n), 15.0);
        assert_eq!(recency_score(at(40, 0), n), 5.0);
        assert_eq!(recency_score(None, n), 40.0);
    }

    #[test]
    fn recency_boundaries_are_exclusive() {
        let n = now();
        // Exactly 1 day old drops to 85, exactly 29 days old drops to 5.
        assert_eq!(recency_score(Some(n - Duration::days(1)), n), 85.0);
        assert_eq!(recency_score(Some(n - Duration::days(29)), n), 5.0);
    }

    #[test]
    fn composite_example() {
        // keyword=80, recency=100, weight=1.0 → 40 + 30 + 20 = 90
        assert_eq!(composite(80.0, 100.0, 1.0), 90.0);
    }

    #[test]
    fn composite_is_bounded() {
        assert_eq!(composite(100.0, 100.0, 1.0), 100.0);
        assert_eq!(composite(0.0, 0.0, 0.0), 0.0);
    }
}
