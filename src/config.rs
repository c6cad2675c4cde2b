// src/config.rs
//! Runtime configuration from environment variables (loaded via dotenv in
//! the binary). Every knob has a default so a bare environment still runs;
//! missing API keys disable the capabilities that need them rather than
//! failing startup.

use std::env;

pub const ENV_FIRECRAWL_API_KEY: &str = "FIRECRAWL_API_KEY";
pub const ENV_SERPAPI_API_KEY: &str = "SERPAPI_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_TIKA_URL: &str = "TIKA_URL";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub firecrawl_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub tika_url: String,

    /// How often the scheduler scans publications for staleness.
    pub scan_interval_secs: u64,
    /// A publication is due when its last run is older than this.
    pub staleness_hours: i64,

    /// Cap on simultaneous per-source adapter calls within one run.
    pub max_concurrent_sources: usize,
    /// Per-source adapter timeout; a timed-out source is a per-source error.
    pub source_timeout_secs: u64,
    /// Items older than this are dropped at discovery time.
    pub max_item_age_days: i64,

    pub triage_enabled: bool,
    pub triage_model: String,
    pub triage_batch_size: usize,

    pub analysis_model: String,

    /// Minimum composite score before enrichment is attempted.
    pub enrichment_min_score: f64,
    /// Scrape-call budget per run (feed-carried content is free).
    pub enrichment_max_per_run: usize,

    pub source_weights_path: String,
    pub seed_path: String,
    pub metrics_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            firecrawl_api_key: None,
            serpapi_api_key: None,
            anthropic_api_key: None,
            tika_url: "http://localhost:9998".into(),
            scan_interval_secs: 3600,
            staleness_hours: 24,
            max_concurrent_sources: 4,
            source_timeout_secs: 120,
            max_item_age_days: 90,
            triage_enabled: true,
            triage_model: "claude-haiku-4-5-20251001".into(),
            triage_batch_size: 40,
            analysis_model: "claude-sonnet-4-20250514".into(),
            enrichment_min_score: 25.0,
            enrichment_max_per_run: 50,
            source_weights_path: "config/source_weights.json".into(),
            seed_path: "config/publications.json".into(),
            metrics_port: 9187,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_string(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_string(name).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            firecrawl_api_key: env_string(ENV_FIRECRAWL_API_KEY),
            serpapi_api_key: env_string(ENV_SERPAPI_API_KEY),
            anthropic_api_key: env_string(ENV_ANTHROPIC_API_KEY),
            tika_url: env_string(ENV_TIKA_URL).unwrap_or(defaults.tika_url),
            scan_interval_secs: env_parse("RESEARCH_SCAN_INTERVAL_SECS", defaults.scan_interval_secs),
            staleness_hours: env_parse("RESEARCH_STALENESS_HOURS", defaults.staleness_hours),
            max_concurrent_sources: env_parse(
                "RESEARCH_MAX_CONCURRENT_SOURCES",
                defaults.max_concurrent_sources,
            ),
            source_timeout_secs: env_parse("RESEARCH_SOURCE_TIMEOUT_SECS", defaults.source_timeout_secs),
            max_item_age_days: env_parse("RESEARCH_MAX_ITEM_AGE_DAYS", defaults.max_item_age_days),
            triage_enabled: env_bool("TRIAGE_ENABLED", defaults.triage_enabled),
            triage_model: env_string("TRIAGE_MODEL").unwrap_or(defaults.triage_model),
            triage_batch_size: env_parse("TRIAGE_MAX_BATCH_SIZE", defaults.triage_batch_size),
            analysis_model: env_string("ANALYSIS_MODEL").unwrap_or(defaults.analysis_model),
            enrichment_min_score: env_parse("ENRICHMENT_MIN_SCORE", defaults.enrichment_min_score),
            enrichment_max_per_run: env_parse(
                "ENRICHMENT_MAX_PER_RUN",
                defaults.enrichment_max_per_run,
            ),
            source_weights_path: env_string("SOURCE_WEIGHTS_PATH")
                .unwrap_or(defaults.source_weights_path),
            seed_path: env_string("PUBLICATIONS_SEED_PATH").unwrap_or(defaults.seed_path),
            metrics_port: env_parse("METRICS_PORT", defaults.metrics_port),
        }
    }
}
