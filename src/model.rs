// src/model.rs
//! Core domain types: publications, configured sources, items coming out of
//! discovery, and persisted candidates with their status lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open key-value bag carried by discovered items and candidates.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The kind of external feed a source points at. Selects the discovery
/// adapter; `Competitor` reuses the news-site adapter with a metadata flag,
/// and `HouseContent` has no adapter at all (it exists for source weighting
/// and keyword-search domain exclusion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    RssFeed,
    NewsSite,
    KeywordSearch,
    Competitor,
    DataReport,
    HouseContent,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RssFeed => "rss_feed",
            SourceKind::NewsSite => "news_site",
            SourceKind::KeywordSearch => "keyword_search",
            SourceKind::Competitor => "competitor",
            SourceKind::DataReport => "data_report",
            SourceKind::HouseContent => "house_content",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured external feed owned by a publication. Read-only input to
/// adapters during a run, except that the data-report adapter writes its
/// prior-period context back into `config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub publication_id: i64,
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: i64,
    pub name: String,
    /// The publication's own site domain, excluded from keyword-search hits.
    #[serde(default)]
    pub domain: Option<String>,
    /// Free-text description of the industry/topic the publication covers.
    #[serde(default)]
    pub topic_description: Option<String>,
    #[serde(default)]
    pub reader_personas: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub last_research_run: Option<DateTime<Utc>>,
    /// When set, only `Selected` candidates are externally visible;
    /// otherwise `New` candidates are ready-to-use as discovered.
    #[serde(default)]
    pub require_review: bool,
    /// Credential for on-demand research triggers scoped to this publication.
    #[serde(default)]
    pub research_api_key: Option<String>,
}

impl Publication {
    /// Read-time visibility filter: which status external consumers see.
    pub fn visible_status(&self) -> CandidateStatus {
        if self.require_review {
            CandidateStatus::Selected
        } else {
            CandidateStatus::New
        }
    }
}

/// Adapter output. Exists only within one run until persisted or discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DiscoveredItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// All four scoring components are stored so the breakdown stays inspectable
/// without recomputation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub recency: f64,
    pub source_weight: f64,
    pub relevance: f64,
}

/// Editorial color band derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceBand {
    Strong,
    Moderate,
    Weak,
}

impl ScoreBreakdown {
    pub fn band(&self) -> RelevanceBand {
        if self.relevance >= 70.0 {
            RelevanceBand::Strong
        } else if self.relevance >= 40.0 {
            RelevanceBand::Moderate
        } else {
            RelevanceBand::Weak
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    New,
    Selected,
    Rejected,
    Processed,
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandidateStatus::New => "new",
            CandidateStatus::Selected => "selected",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Processed => "processed",
        };
        f.write_str(s)
    }
}

impl CandidateStatus {
    /// Lifecycle rules. `New` can go anywhere (including straight to
    /// `Processed` for publications that skip review); `Selected` and
    /// `Rejected` swap freely; `Processed` only resets to `New`.
    pub fn can_transition(self, to: CandidateStatus) -> bool {
        use CandidateStatus::*;
        matches!(
            (self, to),
            (New, Selected)
                | (New, Rejected)
                | (New, Processed)
                | (Selected, Rejected)
                | (Selected, Processed)
                | (Rejected, Selected)
                | (Rejected, New)
                | (Processed, New)
        )
    }
}

/// Persisted, scored, reviewable item. Created only by the pipeline; mutated
/// only through status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub publication_id: i64,
    pub source_id: i64,
    /// Canonical URL (see `canonical`).
    pub url: String,
    /// SHA-256 of the canonical URL; `(publication_id, url_hash)` is unique.
    pub url_hash: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub scores: ScoreBreakdown,
    pub status: CandidateStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Produced-content link, set only while `Processed`.
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub publication_id: i64,
    pub source_id: i64,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scores: ScoreBreakdown,
    pub status: CandidateStatus,
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_documented_paths() {
        use CandidateStatus::*;
        assert!(New.can_transition(Selected));
        assert!(Selected.can_transition(Processed));
        assert!(Rejected.can_transition(Selected));
        assert!(Rejected.can_transition(New));
        assert!(Processed.can_transition(New));
    }

    #[test]
    fn lifecycle_rejects_everything_else() {
        use CandidateStatus::*;
        assert!(!Processed.can_transition(Rejected));
        assert!(!Processed.can_transition(Selected));
        assert!(!Rejected.can_transition(Processed));
        assert!(!New.can_transition(New));
        assert!(!Selected.can_transition(Selected));
    }

    #[test]
    fn visibility_follows_review_flag() {
        let mut publication = Publication {
            id: 1,
            name: "Grain Wire".into(),
            domain: None,
            topic_description: None,
            reader_personas: None,
            active: true,
            last_research_run: None,
            require_review: false,
            research_api_key: None,
        };
        assert_eq!(publication.visible_status(), CandidateStatus::New);
        publication.require_review = true;
        assert_eq!(publication.visible_status(), CandidateStatus::Selected);
    }

    #[test]
    fn score_bands() {
        let s = |relevance| ScoreBreakdown {
            relevance,
            ..Default::default()
        };
        assert_eq!(s(90.0).band(), RelevanceBand::Strong);
        assert_eq!(s(70.0).band(), RelevanceBand::Strong);
        assert_eq!(s(55.0).band(), RelevanceBand::Moderate);
        assert_eq!(s(39.9).band(), RelevanceBand::Weak);
    }
}
