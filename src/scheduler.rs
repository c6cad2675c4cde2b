// src/scheduler.rs
//! Background scheduling: a periodic staleness scan plus on-demand triggers,
//! all converging on one queue that feeds the pipeline. Concurrent or
//! redundant triggers for the same publication are safe — the duplicate
//! checks and the store's uniqueness constraint absorb the overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::pipeline::{self, PipelineDeps};
use crate::store::Store;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub scan_interval_secs: u64,
    /// A publication is due when its last run is absent or older than this.
    pub staleness_hours: i64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            scan_interval_secs: 3600,
            staleness_hours: 24,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TriggerError {
    #[error("publication {0} not found or inactive")]
    UnknownPublication(i64),

    #[error("invalid research API key for publication {0}")]
    BadCredential(i64),

    #[error("scheduler is shut down")]
    Closed,

    #[error("store error: {0}")]
    Store(String),
}

/// Handle for enqueueing research runs. Cloneable; all clones share the
/// same queue and worker.
#[derive(Clone)]
pub struct ResearchScheduler {
    deps: Arc<PipelineDeps>,
    tx: mpsc::UnboundedSender<i64>,
}

impl ResearchScheduler {
    /// Build the scheduler and spawn the worker draining the run queue.
    pub fn new(deps: PipelineDeps) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
        let deps = Arc::new(deps);

        let worker_deps = deps.clone();
        let worker = tokio::spawn(async move {
            while let Some(publication_id) = rx.recv().await {
                match pipeline::run(&worker_deps, publication_id).await {
                    Ok(report) => {
                        tracing::debug!(
                            publication_id,
                            new_candidates = report.new_candidates,
                            "queued research run finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(publication_id, error = %e, "research run failed");
                    }
                }
            }
        });

        (Self { deps, tx }, worker)
    }

    /// Enqueue a run. Internal trigger path (scheduler scan, admin action);
    /// the idempotent entry point every trigger converges on.
    pub fn trigger(&self, publication_id: i64) -> Result<(), TriggerError> {
        self.tx
            .send(publication_id)
            .map_err(|_| TriggerError::Closed)
    }

    /// Authenticated external trigger: the caller's key must match the
    /// publication's research API key.
    pub async fn trigger_with_key(
        &self,
        publication_id: i64,
        key: &str,
    ) -> Result<(), TriggerError> {
        let publication = self
            .deps
            .store
            .publication(publication_id)
            .await
            .map_err(|e| TriggerError::Store(e.to_string()))?
            .filter(|p| p.active)
            .ok_or(TriggerError::UnknownPublication(publication_id))?;

        match publication.research_api_key.as_deref() {
            Some(expected) if !key.is_empty() && expected == key => self.trigger(publication_id),
            _ => Err(TriggerError::BadCredential(publication_id)),
        }
    }

    /// Spawn the periodic scan loop enqueueing every due publication.
    pub fn spawn_scan_loop(&self, cfg: SchedulerCfg) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(cfg.scan_interval_secs.max(1)));
            loop {
                ticker.tick().await;
                match scan_once(&*scheduler.deps.store, cfg.staleness_hours).await {
                    Ok(due) => {
                        let dispatched = due.len();
                        for publication_id in due {
                            let _ = scheduler.trigger(publication_id);
                        }
                        tracing::info!(dispatched, "research staleness scan");
                    }
                    Err(e) => tracing::error!(error = %e, "staleness scan failed"),
                }
            }
        })
    }
}

/// Publications due for research: active, stale (or never run), and with at
/// least one active source.
pub async fn scan_once(store: &dyn Store, staleness_hours: i64) -> Result<Vec<i64>, StoreError> {
    let cutoff = Utc::now() - chrono::Duration::hours(staleness_hours);

    let mut due = Vec::new();
    for publication in store.active_publications().await? {
        let stale = publication
            .last_research_run
            .map_or(true, |last| last <= cutoff);
        if !stale {
            continue;
        }
        if store.active_sources(publication.id).await?.is_empty() {
            continue;
        }
        due.push(publication.id);
    }
    Ok(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Publication, Source, SourceKind};
    use crate::store::InMemoryStore;

    fn publication(id: i64, last_run_hours_ago: Option<i64>) -> Publication {
        Publication {
            id,
            name: format!("pub-{id}"),
            domain: None,
            topic_description: None,
            reader_personas: None,
            active: true,
            last_research_run: last_run_hours_ago
                .map(|h| Utc::now() - chrono::Duration::hours(h)),
            require_review: false,
            research_api_key: None,
        }
    }

    fn source(id: i64, publication_id: i64, active: bool) -> Source {
        Source {
            id,
            publication_id,
            name: format!("src-{id}"),
            kind: SourceKind::RssFeed,
            url: Some("https://feeds.example.com/rss".into()),
            keywords: None,
            config: None,
            active,
        }
    }

    #[tokio::test]
    async fn scan_picks_stale_and_never_run_publications() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1, None)); // never run
        store.seed_publication(publication(2, Some(48))); // stale
        store.seed_publication(publication(3, Some(1))); // fresh
        for (sid, pid) in [(1, 1), (2, 2), (3, 3)] {
            store.seed_source(source(sid, pid, true));
        }

        let due = scan_once(&store, 24).await.unwrap();
        assert_eq!(due, vec![1, 2]);
    }

    #[tokio::test]
    async fn scan_skips_publications_without_active_sources() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1, None));
        store.seed_publication(publication(2, None));
        store.seed_source(source(1, 1, false)); // inactive source only
        store.seed_source(source(2, 2, true));

        let due = scan_once(&store, 24).await.unwrap();
        assert_eq!(due, vec![2]);
    }

    #[tokio::test]
    async fn scan_skips_inactive_publications() {
        let store = InMemoryStore::new();
        let mut p = publication(1, None);
        p.active = false;
        store.seed_publication(p);
        store.seed_source(source(1, 1, true));

        let due = scan_once(&store, 24).await.unwrap();
        assert!(due.is_empty());
    }
}
