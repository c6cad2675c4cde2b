// src/pipeline.rs
//! The per-publication research run: discover across all active sources,
//! dedup, triage, score, enrich, persist.
//!
//! Per-source adapter calls are the unit of parallelism — independent
//! endpoints, isolated failures — and run under a bounded semaphore with a
//! per-call timeout. Everything after discovery is a sequential pass over
//! the surviving items; the store's uniqueness constraint absorbs whatever
//! races remain across concurrent runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use url::Url;

use crate::canonical::{canonicalize, CanonicalUrl};
use crate::clients::{Analyst, PageMapper};
use crate::dedup;
use crate::discover::AdapterRegistry;
use crate::enrich::{self, EnrichOutcome};
use crate::error::{DiscoverError, StoreError};
use crate::model::{
    CandidateStatus, DiscoveredItem, NewCandidate, Publication, ScoreBreakdown, Source, SourceKind,
};
use crate::scoring;
use crate::source_weights::SourceWeights;
use crate::store::{InsertOutcome, Store};
use crate::triage::{self, Verdict};
use crate::url_dates;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("research_runs_total", "Completed research runs.");
        describe_counter!(
            "research_discovered_total",
            "Items returned by discovery adapters."
        );
        describe_counter!("research_candidates_total", "Candidates persisted.");
        describe_counter!(
            "research_duplicates_total",
            "Items skipped by duplicate checks."
        );
        describe_counter!(
            "research_source_errors_total",
            "Per-source discovery failures."
        );
        describe_histogram!("research_source_ms", "Per-source discovery time in ms.");
        describe_gauge!(
            "research_last_run_ts",
            "Unix ts of the last completed research run."
        );
    });
}

/// Tunables for one run; defaults mirror the env-driven `AppConfig`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_concurrent_sources: usize,
    pub source_timeout: Duration,
    pub max_item_age_days: i64,
    pub triage_enabled: bool,
    pub triage_model: Option<String>,
    pub triage_batch_size: usize,
    pub enrichment_min_score: f64,
    pub enrichment_max_per_run: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            source_timeout: Duration::from_secs(120),
            max_item_age_days: 90,
            triage_enabled: true,
            triage_model: None,
            triage_batch_size: 40,
            enrichment_min_score: 25.0,
            enrichment_max_per_run: 50,
        }
    }
}

/// Shared collaborators for runs. Cheap to clone.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn Store>,
    pub adapters: Arc<dyn AdapterRegistry>,
    /// Enrichment scraper; `None` disables enrichment.
    pub mapper: Option<Arc<dyn PageMapper>>,
    /// Triage model; `None` disables triage.
    pub analyst: Option<Arc<dyn Analyst>>,
    pub weights: Arc<SourceWeights>,
    pub cfg: RunConfig,
}

/// Per-run accounting, logged at completion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub publication_id: i64,
    pub sources_scanned: usize,
    pub total_discovered: usize,
    pub new_candidates: usize,
    pub rejected_candidates: usize,
    pub skipped_duplicates: usize,
    pub skipped_excluded: usize,
    pub enriched: usize,
    pub enrichment_skipped: usize,
    pub enrichment_failed: usize,
    pub enrichment_budget_exhausted: usize,
    pub triage_relevant: usize,
    pub triage_maybe: usize,
    pub triage_rejected: usize,
    pub triage_skipped: usize,
    pub errors: usize,
    /// (source name, error) for every source that failed this run.
    pub source_errors: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("publication {0} not found or inactive")]
    PublicationUnavailable(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An item that survived the dedup gauntlet, waiting for triage and scoring.
struct PendingItem {
    item: DiscoveredItem,
    source: Source,
    canonical: CanonicalUrl,
}

/// Run research for one publication. Every active source is attempted; a
/// single source's failure lands in the report, not in the result.
pub async fn run(deps: &PipelineDeps, publication_id: i64) -> Result<RunReport, RunError> {
    ensure_metrics_described();

    let publication = deps
        .store
        .publication(publication_id)
        .await?
        .filter(|p| p.active)
        .ok_or(RunError::PublicationUnavailable(publication_id))?;

    let sources = deps.store.active_sources(publication_id).await?;
    let excluded = excluded_domains(&publication, &sources);
    if !excluded.is_empty() {
        tracing::info!(publication_id, domains = ?excluded, "keyword-search exclusion domains");
    }

    let mut report = RunReport {
        publication_id,
        ..Default::default()
    };

    // ── Phase 1: discover (bounded concurrency) + dedup ──────────────
    let discovered = discover_all(deps, &sources, &mut report).await;
    let pending = dedup_pass(deps, &publication, &excluded, discovered, &mut report).await;

    // ── Phase 2: LLM triage ──────────────────────────────────────────
    let verdicts = triage_pass(deps, &publication, &pending, &mut report).await;

    // ── Phase 3: score + enrich + persist ────────────────────────────
    persist_pass(deps, &publication, pending, verdicts, &mut report).await;

    // The run is complete once every source has been attempted, errors
    // included; stamp the publication either way.
    let now = Utc::now();
    deps.store.mark_research_run(publication_id, now).await?;

    counter!("research_runs_total").increment(1);
    gauge!("research_last_run_ts").set(now.timestamp() as f64);
    tracing::info!(
        publication_id,
        sources_scanned = report.sources_scanned,
        discovered = report.total_discovered,
        new_candidates = report.new_candidates,
        rejected = report.rejected_candidates,
        duplicates = report.skipped_duplicates,
        excluded = report.skipped_excluded,
        errors = report.errors,
        "research run complete"
    );

    Ok(report)
}

/// Run every source's adapter concurrently under the semaphore, each with
/// its own timeout. Results come back ordered by source id so the rest of
/// the run is deterministic.
async fn discover_all(
    deps: &PipelineDeps,
    sources: &[Source],
    report: &mut RunReport,
) -> Vec<(Source, Vec<DiscoveredItem>)> {
    let semaphore = Arc::new(Semaphore::new(deps.cfg.max_concurrent_sources.max(1)));
    let mut join_set: JoinSet<(Source, Result<Vec<DiscoveredItem>, String>)> = JoinSet::new();

    for source in sources.iter().cloned() {
        if deps.adapters.adapter_for(source.kind).is_none() {
            tracing::info!(source = %source.name, kind = %source.kind, "no adapter for source kind, skipping");
            continue;
        }
        let registry = deps.adapters.clone();
        let semaphore = semaphore.clone();
        let source_timeout = deps.cfg.source_timeout;

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let adapter = registry
                .adapter_for(source.kind)
                .expect("checked before spawn");

            let started = std::time::Instant::now();
            let result = match timeout(source_timeout, adapter.discover(&source)).await {
                Ok(Ok(items)) => Ok(items),
                Ok(Err(e)) => Err(classified(&e)),
                Err(_) => Err(format!(
                    "discovery timed out after {}s",
                    source_timeout.as_secs()
                )),
            };
            histogram!("research_source_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
            (source, result)
        });
    }

    let mut discovered = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((source, Ok(items))) => {
                report.sources_scanned += 1;
                report.total_discovered += items.len();
                counter!("research_discovered_total").increment(items.len() as u64);
                discovered.push((source, items));
            }
            Ok((source, Err(message))) => {
                tracing::error!(source = %source.name, error = %message, "source discovery failed");
                counter!("research_source_errors_total").increment(1);
                report.errors += 1;
                report.source_errors.push((source.name.clone(), message));
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "discovery task panicked");
                report.errors += 1;
            }
        }
    }
    discovered.sort_by_key(|(source, _)| source.id);
    discovered
}

fn classified(e: &DiscoverError) -> String {
    match e {
        DiscoverError::Config(_) => format!("configuration: {e}"),
        DiscoverError::Service(_) => format!("service: {e}"),
        DiscoverError::AnalysisFormat(_) => format!("analysis: {e}"),
    }
}

/// Canonicalize, drop duplicates (in-run, candidate table, published
/// content), apply the keyword-search domain exclusion and the max-age
/// filter.
async fn dedup_pass(
    deps: &PipelineDeps,
    publication: &Publication,
    excluded: &HashSet<String>,
    discovered: Vec<(Source, Vec<DiscoveredItem>)>,
    report: &mut RunReport,
) -> Vec<PendingItem> {
    let now = Utc::now();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut pending = Vec::new();

    for (source, items) in discovered {
        for item in items {
            let canonical = match canonicalize(&item.url) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %e, "unparseable item URL");
                    report.errors += 1;
                    continue;
                }
            };

            // In-run dedup: another source already found this URL.
            if seen_hashes.contains(&canonical.hash) {
                report.skipped_duplicates += 1;
                continue;
            }

            let duplicate =
                match dedup::is_duplicate_candidate(&*deps.store, publication.id, &canonical.hash)
                    .await
                {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(error = %e, "duplicate check failed");
                        report.errors += 1;
                        continue;
                    }
                };
            if duplicate {
                report.skipped_duplicates += 1;
                counter!("research_duplicates_total").increment(1);
                continue;
            }

            let published =
                match dedup::is_already_published(&*deps.store, publication.id, &item.url).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error = %e, "published-content check failed");
                        report.errors += 1;
                        continue;
                    }
                };
            if published {
                report.skipped_duplicates += 1;
                counter!("research_duplicates_total").increment(1);
                continue;
            }

            // Keyword-search hits pointing at covered domains duplicate the
            // dedicated sources; drop them here.
            if source.kind == SourceKind::KeywordSearch && !excluded.is_empty() {
                if let Some(host) = Url::parse(&item.url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_lowercase))
                {
                    if excluded.contains(&host) {
                        report.skipped_excluded += 1;
                        continue;
                    }
                }
            }

            // Max-age filter: the adapter-provided date first, then the URL.
            let item_date = item
                .published_at
                .or_else(|| url_dates::date_from_url(&item.url));
            if let Some(date) = item_date {
                if (now - date).num_days() > deps.cfg.max_item_age_days {
                    report.skipped_excluded += 1;
                    continue;
                }
            }

            seen_hashes.insert(canonical.hash.clone());
            pending.push(PendingItem {
                item,
                source: source.clone(),
                canonical,
            });
        }
    }
    pending
}

/// Classify pending items, except the kinds that skip triage. Returns one
/// verdict slot per pending item, in order.
async fn triage_pass(
    deps: &PipelineDeps,
    publication: &Publication,
    pending: &[PendingItem],
    report: &mut RunReport,
) -> Vec<Option<triage::TriageResult>> {
    let mut verdicts: Vec<Option<triage::TriageResult>> = Vec::with_capacity(pending.len());
    verdicts.resize_with(pending.len(), || None);

    let analyst = match (&deps.analyst, deps.cfg.triage_enabled) {
        (Some(analyst), true) => analyst,
        _ => return verdicts,
    };

    let mut triage_indices = Vec::new();
    let mut triage_inputs = Vec::new();
    for (idx, p) in pending.iter().enumerate() {
        if triage::skips_triage(p.source.kind) {
            report.triage_skipped += 1;
        } else {
            triage_indices.push(idx);
            triage_inputs.push((&p.item, p.source.kind));
        }
    }
    if triage_inputs.is_empty() {
        return verdicts;
    }

    let results = triage::triage_items(
        analyst.as_ref(),
        publication,
        &triage_inputs,
        deps.cfg.triage_model.as_deref(),
        deps.cfg.triage_batch_size,
    )
    .await;

    for (idx, result) in triage_indices.into_iter().zip(results) {
        match result.verdict {
            Verdict::RelevantNews => report.triage_relevant += 1,
            Verdict::Maybe => report.triage_maybe += 1,
            Verdict::NotNews => report.triage_rejected += 1,
        }
        verdicts[idx] = Some(result);
    }
    verdicts
}

/// Score, enrich within budget, and persist every surviving item. Items the
/// triage called not-news persist as rejected tombstones so reruns dedup
/// against them instead of rediscovering them forever.
async fn persist_pass(
    deps: &PipelineDeps,
    publication: &Publication,
    pending: Vec<PendingItem>,
    verdicts: Vec<Option<triage::TriageResult>>,
    report: &mut RunReport,
) {
    let now = Utc::now();
    let mut scrape_calls_used = 0usize;

    for (p, verdict) in pending.into_iter().zip(verdicts) {
        let PendingItem {
            mut item,
            source,
            canonical,
        } = p;

        if let Some(v) = &verdict {
            item.metadata
                .insert("triage_verdict".into(), v.verdict.as_str().into());
            item.metadata
                .insert("triage_reasoning".into(), v.reasoning.clone().into());
        }

        // not_news → rejected tombstone, no scoring or enrichment.
        if verdict.as_ref().map(|v| v.verdict) == Some(Verdict::NotNews) {
            let candidate = NewCandidate {
                publication_id: publication.id,
                source_id: source.id,
                url: canonical.url,
                url_hash: canonical.hash,
                title: item.title,
                snippet: item.snippet,
                author: item.author,
                published_at: item.published_at,
                scores: ScoreBreakdown::default(),
                status: CandidateStatus::Rejected,
                metadata: item.metadata,
            };
            match deps.store.insert_candidate(candidate).await {
                Ok(InsertOutcome::Inserted(_)) => report.rejected_candidates += 1,
                Ok(InsertOutcome::Duplicate) => report.skipped_duplicates += 1,
                Err(e) => {
                    tracing::error!(error = %e, "failed to persist rejected candidate");
                    report.errors += 1;
                }
            }
            continue;
        }

        let mut scores = scoring::score_item(&item, &source, publication, &deps.weights, now);

        // ── Enrichment (budgeted) ────────────────────────────────────
        let wants_enrichment = scores.relevance >= deps.cfg.enrichment_min_score
            && source.kind != SourceKind::DataReport;
        let free_enrichment = item.metadata.contains_key("rss_full_content");

        if wants_enrichment {
            match &deps.mapper {
                Some(mapper)
                    if free_enrichment || scrape_calls_used < deps.cfg.enrichment_max_per_run =>
                {
                    let outcome = enrich::enrich_item(
                        mapper.as_ref(),
                        &item.url,
                        &mut item.metadata,
                        source.url.as_deref(),
                    )
                    .await;
                    match outcome {
                        EnrichOutcome::Enriched { free } => {
                            report.enriched += 1;
                            if !free {
                                scrape_calls_used += 1;
                            }
                        }
                        EnrichOutcome::Failed { used_network } => {
                            report.enrichment_failed += 1;
                            if used_network {
                                scrape_calls_used += 1;
                            }
                        }
                    }
                }
                Some(_) => {
                    report.enrichment_budget_exhausted += 1;
                    report.enrichment_skipped += 1;
                }
                None => report.enrichment_skipped += 1,
            }
        } else {
            report.enrichment_skipped += 1;
        }

        // ── Backfill missing publish dates and rescore ───────────────
        let mut published_at = item.published_at;
        if published_at.is_none() {
            published_at = verdict
                .as_ref()
                .and_then(|v| v.published_at)
                .or_else(|| {
                    item.metadata
                        .get("extracted_published_date")
                        .and_then(|v| v.as_str())
                        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                })
                .or_else(|| url_dates::date_from_url(&item.url));

            if let Some(date) = published_at {
                let recency = scoring::recency_score(Some(date), now);
                scores.recency = recency;
                scores.relevance = scoring::composite(scores.keyword, recency, scores.source_weight);
            }
        }

        let candidate = NewCandidate {
            publication_id: publication.id,
            source_id: source.id,
            url: canonical.url,
            url_hash: canonical.hash,
            title: item.title,
            snippet: item.snippet,
            author: item.author,
            published_at,
            scores,
            status: CandidateStatus::New,
            metadata: item.metadata,
        };
        match deps.store.insert_candidate(candidate).await {
            Ok(InsertOutcome::Inserted(_)) => {
                report.new_candidates += 1;
                counter!("research_candidates_total").increment(1);
            }
            Ok(InsertOutcome::Duplicate) => report.skipped_duplicates += 1,
            Err(e) => {
                tracing::error!(error = %e, "failed to persist candidate");
                report.errors += 1;
            }
        }
    }
}

/// Domains excluded from keyword-search hits: the publication's own site
/// plus competitor and house-content source domains, www-insensitive.
fn excluded_domains(publication: &Publication, sources: &[Source]) -> HashSet<String> {
    let mut out = HashSet::new();

    let mut add = |domain: &str| {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() {
            return;
        }
        match domain.strip_prefix("www.") {
            Some(bare) => {
                out.insert(bare.to_string());
                out.insert(domain.clone());
            }
            None => {
                out.insert(format!("www.{domain}"));
                out.insert(domain.clone());
            }
        }
    };

    if let Some(domain) = &publication.domain {
        add(domain);
    }
    for source in sources {
        if matches!(
            source.kind,
            SourceKind::Competitor | SourceKind::HouseContent
        ) {
            if let Some(host) = source
                .url
                .as_deref()
                .and_then(|u| Url::parse(u).ok())
                .and_then(|u| u.host_str().map(str::to_string))
            {
                add(&host);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publication_with_domain(domain: &str) -> Publication {
        Publication {
            id: 1,
            name: "wire".into(),
            domain: Some(domain.into()),
            topic_description: None,
            reader_personas: None,
            active: true,
            last_research_run: None,
            require_review: false,
            research_api_key: None,
        }
    }

    fn source(kind: SourceKind, url: Option<&str>) -> Source {
        Source {
            id: 1,
            publication_id: 1,
            name: "s".into(),
            kind,
            url: url.map(String::from),
            keywords: None,
            config: None,
            active: true,
        }
    }

    #[test]
    fn excluded_domains_cover_www_variants() {
        let publication = publication_with_domain("grainwire.com");
        let sources = vec![
            source(SourceKind::Competitor, Some("https://www.rivalag.com/news")),
            source(SourceKind::HouseContent, Some("https://blog.grainwire.com")),
            source(SourceKind::RssFeed, Some("https://feeds.example.com/rss")),
        ];

        let excluded = excluded_domains(&publication, &sources);
        for expected in [
            "grainwire.com",
            "www.grainwire.com",
            "rivalag.com",
            "www.rivalag.com",
            "blog.grainwire.com",
            "www.blog.grainwire.com",
        ] {
            assert!(excluded.contains(expected), "missing {expected}");
        }
        assert!(!excluded.contains("feeds.example.com"));
    }
}
