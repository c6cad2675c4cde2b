// src/store/mod.rs
//! Persistence capability consumed by the pipeline.
//!
//! The trait is the contract; `InMemoryStore` is the bundled implementation
//! used by the daemon and tests. Whatever the backend, `insert_candidate`
//! must enforce the `(publication_id, url_hash)` uniqueness invariant
//! atomically — discovery can race across trigger paths — and report a lost
//! race as `InsertOutcome::Duplicate`, never as an error.

mod memory;

pub use memory::{InMemoryStore, StoreSeed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{Candidate, CandidateStatus, NewCandidate, Publication, Source};

/// Result of a candidate insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// The `(publication, url_hash)` slot was already taken. Success-by-skip.
    Duplicate,
}

/// Filter for candidate queries, matching the outward read contract:
/// status, minimum composite score, source, and result cap. Results are
/// ordered by relevance, best first.
#[derive(Debug, Clone, Default)]
pub struct CandidateQuery {
    pub status: Option<CandidateStatus>,
    pub min_relevance: Option<f64>,
    pub source_id: Option<i64>,
    pub limit: Option<usize>,
}

/// Editorial status change. `rejection_reason` is honored on transitions to
/// `Rejected`, `content_id` on transitions to `Processed`.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub status: Option<CandidateStatus>,
    pub rejection_reason: Option<String>,
    pub content_id: Option<i64>,
}

impl StatusChange {
    pub fn to(status: CandidateStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn rejected(reason: Option<String>) -> Self {
        Self {
            status: Some(CandidateStatus::Rejected),
            rejection_reason: reason,
            content_id: None,
        }
    }

    pub fn processed(content_id: i64) -> Self {
        Self {
            status: Some(CandidateStatus::Processed),
            rejection_reason: None,
            content_id: Some(content_id),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn publication(&self, id: i64) -> Result<Option<Publication>, StoreError>;

    async fn active_publications(&self) -> Result<Vec<Publication>, StoreError>;

    async fn active_sources(&self, publication_id: i64) -> Result<Vec<Source>, StoreError>;

    async fn source(&self, id: i64) -> Result<Option<Source>, StoreError>;

    /// Replace a source's free-form config object. Used by the data-report
    /// adapter to carry prior-period analysis context across runs.
    async fn update_source_config(
        &self,
        source_id: i64,
        config: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn insert_candidate(&self, candidate: NewCandidate)
        -> Result<InsertOutcome, StoreError>;

    async fn candidate(&self, id: i64) -> Result<Option<Candidate>, StoreError>;

    /// Exact-match lookup against the uniqueness invariant.
    async fn candidate_exists(
        &self,
        publication_id: i64,
        url_hash: &str,
    ) -> Result<bool, StoreError>;

    async fn list_candidates(
        &self,
        publication_id: i64,
        query: &CandidateQuery,
    ) -> Result<Vec<Candidate>, StoreError>;

    /// Apply a lifecycle transition to one candidate. Illegal transitions
    /// fail with `StoreError::InvalidTransition` and leave the row unchanged.
    async fn update_candidate_status(
        &self,
        id: i64,
        change: StatusChange,
    ) -> Result<Candidate, StoreError>;

    /// Batch form of `update_candidate_status`: all-or-nothing. Every
    /// transition is validated before any row is written.
    async fn update_candidate_statuses(
        &self,
        ids: &[i64],
        change: StatusChange,
    ) -> Result<Vec<Candidate>, StoreError>;

    /// Canonical source URLs of content already produced for the
    /// publication, for the published-content duplicate check.
    async fn published_urls(&self, publication_id: i64) -> Result<Vec<String>, StoreError>;

    async fn mark_research_run(
        &self,
        publication_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Shared transition application: validate against the lifecycle, then
/// update the row's status-dependent fields. A produced-content link only
/// lives on `Processed` rows; a rejection reason only on `Rejected` rows.
pub(crate) fn apply_status_change(
    candidate: &mut Candidate,
    change: &StatusChange,
) -> Result<(), StoreError> {
    let Some(to) = change.status else {
        return Ok(());
    };
    if !candidate.status.can_transition(to) {
        return Err(StoreError::InvalidTransition {
            from: candidate.status,
            to,
        });
    }

    candidate.status = to;
    match to {
        CandidateStatus::Rejected => {
            candidate.rejection_reason = change.rejection_reason.clone();
            candidate.content_id = None;
        }
        CandidateStatus::Processed => {
            candidate.content_id = change.content_id;
            candidate.rejection_reason = None;
        }
        CandidateStatus::New | CandidateStatus::Selected => {
            candidate.content_id = None;
            candidate.rejection_reason = None;
        }
    }
    Ok(())
}
