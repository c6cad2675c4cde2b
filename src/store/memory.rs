// src/store/memory.rs
//! In-memory store: a mutex-guarded table set with the same invariants a
//! database backend would enforce. The daemon seeds it from a JSON file;
//! tests seed it directly.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::StoreError;
use crate::model::{Candidate, NewCandidate, Publication, Source};
use crate::store::{apply_status_change, CandidateQuery, InsertOutcome, StatusChange, Store};

/// Seed file shape for the daemon (`config/publications.json`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// publication_id → canonical URLs of already-produced content.
    #[serde(default)]
    pub published_urls: HashMap<i64, Vec<String>>,
}

#[derive(Default)]
struct Inner {
    publications: HashMap<i64, Publication>,
    sources: HashMap<i64, Source>,
    candidates: HashMap<i64, Candidate>,
    /// Uniqueness index backing the `(publication, url_hash)` invariant.
    hash_index: HashSet<(i64, String)>,
    published: HashMap<i64, Vec<String>>,
    next_candidate_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: StoreSeed) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().expect("store lock");
            for p in seed.publications {
                inner.publications.insert(p.id, p);
            }
            for s in seed.sources {
                inner.sources.insert(s.id, s);
            }
            inner.published = seed.published_urls;
        }
        store
    }

    pub fn seed_publication(&self, publication: Publication) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.publications.insert(publication.id, publication);
    }

    pub fn seed_source(&self, source: Source) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.sources.insert(source.id, source);
    }

    pub fn seed_published_url(&self, publication_id: i64, url: impl Into<String>) {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .published
            .entry(publication_id)
            .or_default()
            .push(url.into());
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn publication(&self, id: i64) -> Result<Option<Publication>, StoreError> {
        Ok(self.lock()?.publications.get(&id).cloned())
    }

    async fn active_publications(&self) -> Result<Vec<Publication>, StoreError> {
        let inner = self.lock()?;
        let mut out: Vec<_> = inner
            .publications
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn active_sources(&self, publication_id: i64) -> Result<Vec<Source>, StoreError> {
        let inner = self.lock()?;
        let mut out: Vec<_> = inner
            .sources
            .values()
            .filter(|s| s.publication_id == publication_id && s.active)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    async fn source(&self, id: i64) -> Result<Option<Source>, StoreError> {
        Ok(self.lock()?.sources.get(&id).cloned())
    }

    async fn update_source_config(
        &self,
        source_id: i64,
        config: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let source = inner
            .sources
            .get_mut(&source_id)
            .ok_or(StoreError::SourceNotFound(source_id))?;
        source.config = Some(config);
        Ok(())
    }

    async fn insert_candidate(
        &self,
        candidate: NewCandidate,
    ) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock()?;

        let key = (candidate.publication_id, candidate.url_hash.clone());
        if !inner.hash_index.insert(key) {
            return Ok(InsertOutcome::Duplicate);
        }

        inner.next_candidate_id += 1;
        let id = inner.next_candidate_id;
        inner.candidates.insert(
            id,
            Candidate {
                id,
                publication_id: candidate.publication_id,
                source_id: candidate.source_id,
                url: candidate.url,
                url_hash: candidate.url_hash,
                title: candidate.title,
                snippet: candidate.snippet,
                author: candidate.author,
                published_at: candidate.published_at,
                scores: candidate.scores,
                status: candidate.status,
                rejection_reason: None,
                content_id: None,
                metadata: candidate.metadata,
                created_at: Utc::now(),
            },
        );
        Ok(InsertOutcome::Inserted(id))
    }

    async fn candidate(&self, id: i64) -> Result<Option<Candidate>, StoreError> {
        Ok(self.lock()?.candidates.get(&id).cloned())
    }

    async fn candidate_exists(
        &self,
        publication_id: i64,
        url_hash: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .hash_index
            .contains(&(publication_id, url_hash.to_string())))
    }

    async fn list_candidates(
        &self,
        publication_id: i64,
        query: &CandidateQuery,
    ) -> Result<Vec<Candidate>, StoreError> {
        let inner = self.lock()?;
        let mut out: Vec<_> = inner
            .candidates
            .values()
            .filter(|c| c.publication_id == publication_id)
            .filter(|c| query.status.map_or(true, |s| c.status == s))
            .filter(|c| {
                query
                    .min_relevance
                    .map_or(true, |min| c.scores.relevance >= min)
            })
            .filter(|c| query.source_id.map_or(true, |id| c.source_id == id))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.scores
                .relevance
                .partial_cmp(&a.scores.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn update_candidate_status(
        &self,
        id: i64,
        change: StatusChange,
    ) -> Result<Candidate, StoreError> {
        let mut inner = self.lock()?;
        let candidate = inner
            .candidates
            .get_mut(&id)
            .ok_or(StoreError::CandidateNotFound(id))?;
        apply_status_change(candidate, &change)?;
        Ok(candidate.clone())
    }

    async fn update_candidate_statuses(
        &self,
        ids: &[i64],
        change: StatusChange,
    ) -> Result<Vec<Candidate>, StoreError> {
        let mut inner = self.lock()?;

        // Validate the whole batch before touching any row.
        for id in ids {
            let candidate = inner
                .candidates
                .get(id)
                .ok_or(StoreError::CandidateNotFound(*id))?;
            if let Some(to) = change.status {
                if !candidate.status.can_transition(to) {
                    return Err(StoreError::InvalidTransition {
                        from: candidate.status,
                        to,
                    });
                }
            }
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let candidate = inner.candidates.get_mut(id).expect("validated above");
            apply_status_change(candidate, &change)?;
            out.push(candidate.clone());
        }
        Ok(out)
    }

    async fn published_urls(&self, publication_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .published
            .get(&publication_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_research_run(
        &self,
        publication_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let publication = inner
            .publications
            .get_mut(&publication_id)
            .ok_or(StoreError::PublicationNotFound(publication_id))?;
        publication.last_research_run = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateStatus, ScoreBreakdown};

    fn publication(id: i64) -> Publication {
        Publication {
            id,
            name: format!("pub-{id}"),
            domain: None,
            topic_description: None,
            reader_personas: None,
            active: true,
            last_research_run: None,
            require_review: false,
            research_api_key: None,
        }
    }

    fn new_candidate(publication_id: i64, hash: &str) -> NewCandidate {
        NewCandidate {
            publication_id,
            source_id: 1,
            url: format!("https://example.com/{hash}"),
            url_hash: hash.to_string(),
            title: None,
            snippet: None,
            author: None,
            published_at: None,
            scores: ScoreBreakdown::default(),
            status: CandidateStatus::New,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_skip_not_an_error() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));

        let first = store.insert_candidate(new_candidate(1, "abc")).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store.insert_candidate(new_candidate(1, "abc")).await.unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);

        // Same hash under another publication is a different slot.
        store.seed_publication(publication(2));
        let other = store.insert_candidate(new_candidate(2, "abc")).await.unwrap();
        assert!(matches!(other, InsertOutcome::Inserted(_)));
    }

    #[tokio::test]
    async fn invalid_transition_leaves_row_unchanged() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        let InsertOutcome::Inserted(id) =
            store.insert_candidate(new_candidate(1, "x")).await.unwrap()
        else {
            panic!("expected insert");
        };

        store
            .update_candidate_status(id, StatusChange::to(CandidateStatus::Selected))
            .await
            .unwrap();
        store
            .update_candidate_status(id, StatusChange::processed(77))
            .await
            .unwrap();

        let err = store
            .update_candidate_status(id, StatusChange::rejected(Some("late".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let row = store.candidate(id).await.unwrap().unwrap();
        assert_eq!(row.status, CandidateStatus::Processed);
        assert_eq!(row.content_id, Some(77));
    }

    #[tokio::test]
    async fn reset_to_new_clears_content_link() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        let InsertOutcome::Inserted(id) =
            store.insert_candidate(new_candidate(1, "x")).await.unwrap()
        else {
            panic!("expected insert");
        };

        store
            .update_candidate_status(id, StatusChange::to(CandidateStatus::Selected))
            .await
            .unwrap();
        store
            .update_candidate_status(id, StatusChange::processed(5))
            .await
            .unwrap();
        let row = store
            .update_candidate_status(id, StatusChange::to(CandidateStatus::New))
            .await
            .unwrap();
        assert_eq!(row.status, CandidateStatus::New);
        assert_eq!(row.content_id, None);
    }

    #[tokio::test]
    async fn batch_update_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        let mut ids = Vec::new();
        for h in ["a", "b"] {
            let InsertOutcome::Inserted(id) =
                store.insert_candidate(new_candidate(1, h)).await.unwrap()
            else {
                panic!("expected insert");
            };
            ids.push(id);
        }
        // Push the second candidate to Processed so Selected is illegal for it.
        store
            .update_candidate_status(ids[1], StatusChange::to(CandidateStatus::Processed))
            .await
            .unwrap();

        let err = store
            .update_candidate_statuses(&ids, StatusChange::to(CandidateStatus::Selected))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        // First candidate must be untouched.
        let first = store.candidate(ids[0]).await.unwrap().unwrap();
        assert_eq!(first.status, CandidateStatus::New);
    }

    #[tokio::test]
    async fn list_orders_by_relevance_and_applies_filters() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        for (hash, relevance) in [("a", 20.0), ("b", 80.0), ("c", 50.0)] {
            let mut c = new_candidate(1, hash);
            c.scores.relevance = relevance;
            store.insert_candidate(c).await.unwrap();
        }

        let all = store
            .list_candidates(1, &CandidateQuery::default())
            .await
            .unwrap();
        let rel: Vec<f64> = all.iter().map(|c| c.scores.relevance).collect();
        assert_eq!(rel, vec![80.0, 50.0, 20.0]);

        let filtered = store
            .list_candidates(
                1,
                &CandidateQuery {
                    min_relevance: Some(40.0),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].scores.relevance, 80.0);
    }
}
