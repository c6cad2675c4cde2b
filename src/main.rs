// src/main.rs
//! Research daemon: load config and seed data, wire the external clients,
//! and run the scheduler until interrupted. The editorial API and dashboard
//! live elsewhere; this process only discovers and triages candidates.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use newsdesk_research::clients::{
    Analyst, ClaudeClient, Disabled, DocumentFetcher, FirecrawlClient, HttpDocumentFetcher,
    NewsSearch, PageMapper, SerpApiClient, TextExtractor, TikaClient,
};
use newsdesk_research::config::AppConfig;
use newsdesk_research::discover::{
    feed::FeedAdapter, report::ReportAdapter, search::SearchAdapter, site::SiteAdapter, Adapters,
};
use newsdesk_research::pipeline::{PipelineDeps, RunConfig};
use newsdesk_research::scheduler::{ResearchScheduler, SchedulerCfg};
use newsdesk_research::source_weights::SourceWeights;
use newsdesk_research::store::{InMemoryStore, Store, StoreSeed};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env();

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], cfg.metrics_port))
        .install()
    {
        warn!(error = %e, "metrics exporter not started");
    }

    // Publications and sources come from the seed file; candidates live in
    // the in-memory store for the lifetime of the process.
    let seed: StoreSeed = match fs::read_to_string(&cfg.seed_path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("parsing seed file {}", cfg.seed_path))?,
        Err(_) => {
            warn!(path = %cfg.seed_path, "no seed file found, starting empty");
            StoreSeed::default()
        }
    };
    let store = Arc::new(InMemoryStore::from_seed(seed));
    let weights = Arc::new(SourceWeights::load_from_file(&cfg.source_weights_path));

    // Missing credentials disable the dependent capability, not the daemon.
    let firecrawl: Arc<dyn PageMapper> = match cfg.firecrawl_api_key.clone() {
        Some(key) => Arc::new(FirecrawlClient::new(key)),
        None => {
            warn!("FIRECRAWL_API_KEY not set; site mapping and enrichment disabled");
            Arc::new(Disabled("firecrawl api key"))
        }
    };
    let news_search: Arc<dyn NewsSearch> = match cfg.serpapi_api_key.clone() {
        Some(key) => Arc::new(SerpApiClient::new(key)),
        None => {
            warn!("SERPAPI_API_KEY not set; keyword search disabled");
            Arc::new(Disabled("serpapi api key"))
        }
    };
    let analyst: Option<Arc<dyn Analyst>> = cfg
        .anthropic_api_key
        .clone()
        .map(|key| Arc::new(ClaudeClient::new(key, cfg.analysis_model.clone())) as Arc<dyn Analyst>);
    if analyst.is_none() {
        warn!("ANTHROPIC_API_KEY not set; triage and report analysis disabled");
    }
    let report_analyst: Arc<dyn Analyst> = analyst
        .clone()
        .unwrap_or_else(|| Arc::new(Disabled("anthropic api key")));
    let docs: Arc<dyn DocumentFetcher> = Arc::new(HttpDocumentFetcher::new());
    let extractor: Arc<dyn TextExtractor> = Arc::new(TikaClient::new(cfg.tika_url.clone()));

    let adapters = Arc::new(Adapters {
        feed: FeedAdapter::new(),
        site: SiteAdapter::new(firecrawl.clone()),
        search: SearchAdapter::new(news_search),
        report: ReportAdapter::new(
            docs,
            firecrawl.clone(),
            extractor,
            report_analyst,
            store.clone() as Arc<dyn Store>,
        ),
    });

    let deps = PipelineDeps {
        store: store.clone() as Arc<dyn Store>,
        adapters,
        mapper: cfg.firecrawl_api_key.is_some().then(|| firecrawl.clone()),
        analyst,
        weights,
        cfg: RunConfig {
            max_concurrent_sources: cfg.max_concurrent_sources,
            source_timeout: std::time::Duration::from_secs(cfg.source_timeout_secs),
            max_item_age_days: cfg.max_item_age_days,
            triage_enabled: cfg.triage_enabled,
            triage_model: Some(cfg.triage_model.clone()),
            triage_batch_size: cfg.triage_batch_size,
            enrichment_min_score: cfg.enrichment_min_score,
            enrichment_max_per_run: cfg.enrichment_max_per_run,
        },
    };

    let (scheduler, worker) = ResearchScheduler::new(deps);
    let scan = scheduler.spawn_scan_loop(SchedulerCfg {
        scan_interval_secs: cfg.scan_interval_secs,
        staleness_hours: cfg.staleness_hours,
    });

    info!(
        scan_interval_secs = cfg.scan_interval_secs,
        staleness_hours = cfg.staleness_hours,
        metrics_port = cfg.metrics_port,
        "research daemon started"
    );

    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    info!("shutting down");
    scan.abort();
    worker.abort();
    Ok(())
}
