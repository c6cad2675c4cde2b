// src/discover/report.rs
//! Document-analysis adapter: turns one periodically-published data report
//! (PDF or similar) into zero or more story-angle items.
//!
//! Stages: discover document URLs (three mutually exclusive modes) →
//! download + extract text → language-model analysis → one item per story
//! angle, each disambiguated with an `angle=N` query parameter so the same
//! document yields distinct candidates while reruns still dedup against it.
//!
//! This is the only adapter that mutates its own source configuration: the
//! analysis summary and key figures are written back so the next run's
//! prompt can reference prior-period context.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clients::{
    claude::strip_code_fences, Analyst, CompletionRequest, DocumentFetcher, PageMapper,
    TextExtractor,
};
use crate::discover::Discoverer;
use crate::error::DiscoverError;
use crate::model::{DiscoveredItem, Source};
use crate::store::Store;

const MIN_EXTRACTED_CHARS: usize = 100;
const MAX_PROMPT_DOC_CHARS: usize = 150_000;
const ANALYSIS_MAX_TOKENS: u32 = 4096;

fn default_lookback_months() -> u32 {
    2
}

fn default_max_angles() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DiscoveryMode {
    UrlPattern,
    LandingPage,
    ListingApi,
}

/// Source config object for data-report sources. Everything the adapter
/// needs lives here; the `Source.url` column is only a fallback for the
/// landing-page mode.
#[derive(Debug, Clone, Deserialize)]
struct ReportConfig {
    discovery_mode: DiscoveryMode,
    report_name: String,
    publisher: String,
    #[allow(dead_code)] // informational (monthly/weekly), shown in admin UIs
    cadence: String,
    analysis_prompt: String,
    #[serde(default)]
    url_pattern: Option<String>,
    #[serde(default)]
    landing_page_url: Option<String>,
    #[serde(default)]
    listing_url: Option<String>,
    /// Dot-separated field path to document URLs in the listing JSON;
    /// a `[]` suffix on a segment iterates an array.
    #[serde(default)]
    url_path: Option<String>,
    /// Optional parallel path to release dates.
    #[serde(default)]
    date_path: Option<String>,
    #[serde(default = "default_lookback_months")]
    lookback_months: u32,
    #[serde(default = "default_max_angles")]
    max_angles: u32,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    previous_report_data: Option<PreviousReportData>,
}

/// Prior-period context carried in the source config between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousReportData {
    pub report_date: Option<String>,
    pub report_summary: Option<String>,
    #[serde(default)]
    pub key_figures: serde_json::Map<String, serde_json::Value>,
}

/// The structure the model is instructed to return.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportAnalysis {
    pub report_summary: String,
    #[serde(default)]
    pub key_figures: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub story_angles: Vec<StoryAngle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryAngle {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub commodity: Option<String>,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default = "default_angle_type")]
    pub angle_type: AngleType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub change: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleType {
    SupplyShift,
    DemandChange,
    PriceImpact,
    TradeFlow,
    PolicyChange,
    WeatherImpact,
    #[serde(other)]
    Other,
}

fn default_angle_type() -> AngleType {
    AngleType::Other
}

#[derive(Debug, Clone)]
struct ReportDocument {
    url: String,
    /// `YYYY-MM` when the discovery mode knows the period.
    date: Option<String>,
}

pub struct ReportAdapter {
    docs: Arc<dyn DocumentFetcher>,
    mapper: Arc<dyn PageMapper>,
    extractor: Arc<dyn TextExtractor>,
    analyst: Arc<dyn Analyst>,
    store: Arc<dyn Store>,
}

impl ReportAdapter {
    pub fn new(
        docs: Arc<dyn DocumentFetcher>,
        mapper: Arc<dyn PageMapper>,
        extractor: Arc<dyn TextExtractor>,
        analyst: Arc<dyn Analyst>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            docs,
            mapper,
            extractor,
            analyst,
            store,
        }
    }

    async fn discover_documents(
        &self,
        cfg: &ReportConfig,
        source: &Source,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportDocument>, DiscoverError> {
        match cfg.discovery_mode {
            DiscoveryMode::UrlPattern => self.discover_via_pattern(cfg, now).await,
            DiscoveryMode::LandingPage => self.discover_via_landing_page(cfg, source).await,
            DiscoveryMode::ListingApi => self.discover_via_listing(cfg, now).await,
        }
    }

    /// Substitute a month/year token into the URL template for each month in
    /// the lookback window and existence-check each candidate (HEAD only).
    async fn discover_via_pattern(
        &self,
        cfg: &ReportConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportDocument>, DiscoverError> {
        let pattern = cfg
            .url_pattern
            .as_deref()
            .ok_or_else(|| DiscoverError::Config("url_pattern mode requires url_pattern".into()))?;

        let mut documents = Vec::new();
        for months_back in 0..cfg.lookback_months.max(1) {
            let (mmyy, period) = month_token(now, months_back);
            let url = pattern.replace("{MMYY}", &mmyy);

            match self.docs.probe(&url).await {
                Ok(Some(content_type)) => {
                    let looks_like_pdf = content_type.to_lowercase().contains("pdf")
                        || url.to_lowercase().ends_with(".pdf");
                    if looks_like_pdf {
                        tracing::info!(%url, "found report document");
                        documents.push(ReportDocument {
                            url,
                            date: Some(period),
                        });
                    } else {
                        tracing::debug!(%url, %content_type, "probe hit but not a document");
                    }
                }
                Ok(None) => tracing::debug!(%url, "no document at patterned URL"),
                Err(e) => tracing::debug!(%url, error = %e, "probe failed"),
            }
        }
        Ok(documents)
    }

    /// Scrape a landing page for document links.
    async fn discover_via_landing_page(
        &self,
        cfg: &ReportConfig,
        source: &Source,
    ) -> Result<Vec<ReportDocument>, DiscoverError> {
        let landing_url = cfg
            .landing_page_url
            .as_deref()
            .or(source.url.as_deref())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                DiscoverError::Config("landing_page mode requires landing_page_url".into())
            })?;

        let links = self.mapper.scrape_links(landing_url).await?;
        Ok(links
            .into_iter()
            .filter(|l| l.to_lowercase().ends_with(".pdf"))
            .map(|url| ReportDocument { url, date: None })
            .collect())
    }

    /// Fetch a JSON listing endpoint and walk the configured field paths.
    async fn discover_via_listing(
        &self,
        cfg: &ReportConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportDocument>, DiscoverError> {
        let listing_url = cfg
            .listing_url
            .as_deref()
            .ok_or_else(|| DiscoverError::Config("listing_api mode requires listing_url".into()))?;
        let url_path = cfg
            .url_path
            .as_deref()
            .ok_or_else(|| DiscoverError::Config("listing_api mode requires url_path".into()))?;

        let listing = self.docs.fetch_json(listing_url).await?;

        let urls: Vec<String> = extract_path(&listing, url_path)
            .into_iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect();

        let dates: Vec<Option<String>> = match cfg.date_path.as_deref() {
            Some(path) => {
                let raw: Vec<Option<String>> = extract_path(&listing, path)
                    .into_iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                // Only trust dates that line up one-to-one with the URLs.
                if raw.len() == urls.len() {
                    raw
                } else {
                    vec![None; urls.len()]
                }
            }
            None => vec![None; urls.len()],
        };

        let cutoff = shift_months(now, cfg.lookback_months.max(1));
        let documents = urls
            .into_iter()
            .zip(dates)
            .filter(|(_, date)| match date.as_deref().and_then(parse_release_date) {
                Some(released) => released >= cutoff,
                None => true,
            })
            .map(|(url, date)| ReportDocument { url, date })
            .collect();
        Ok(documents)
    }

    async fn analyze_document(
        &self,
        cfg: &ReportConfig,
        text: &str,
    ) -> Result<ReportAnalysis, DiscoverError> {
        let prompt = build_analysis_prompt(cfg, text);
        let reply = self
            .analyst
            .complete(CompletionRequest {
                system: None,
                user: &prompt,
                model: cfg.model.as_deref(),
                max_tokens: ANALYSIS_MAX_TOKENS,
            })
            .await?;

        let payload = strip_code_fences(&reply);
        serde_json::from_str(&payload)
            .map_err(|e| DiscoverError::AnalysisFormat(format!("analysis JSON: {e}")))
    }

    /// Persist the analysis summary back into the source config for the next
    /// run. Read-then-write against the store so concurrent runs converge on
    /// the freshest config rather than a stale in-memory copy.
    async fn carry_over(
        &self,
        source_id: i64,
        analysis: &ReportAnalysis,
        report_date: Option<&str>,
    ) {
        let previous = PreviousReportData {
            report_date: report_date.map(str::to_string),
            report_summary: Some(analysis.report_summary.clone()),
            key_figures: analysis.key_figures.clone(),
        };

        let result = async {
            let current = self
                .store
                .source(source_id)
                .await?
                .and_then(|s| s.config)
                .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

            let mut config = match current {
                serde_json::Value::Object(map) => map,
                _ => Default::default(),
            };
            config.insert(
                "previous_report_data".into(),
                serde_json::to_value(&previous).unwrap_or_default(),
            );
            self.store
                .update_source_config(source_id, serde_json::Value::Object(config))
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(source_id, error = %e, "failed to persist previous_report_data");
        }
    }
}

#[async_trait]
impl Discoverer for ReportAdapter {
    async fn discover(&self, source: &Source) -> Result<Vec<DiscoveredItem>, DiscoverError> {
        let raw = source
            .config
            .clone()
            .ok_or_else(|| DiscoverError::Config("data-report source has no config".into()))?;
        let cfg: ReportConfig = serde_json::from_value(raw)
            .map_err(|e| DiscoverError::Config(format!("data-report config: {e}")))?;

        let now = Utc::now();
        let documents = self.discover_documents(&cfg, source, now).await?;
        if documents.is_empty() {
            tracing::info!(source = %source.name, "no report documents discovered");
            return Ok(Vec::new());
        }

        // One bad document must not sink the others: failures are logged and
        // the loop moves on.
        let mut items = Vec::new();
        for document in &documents {
            match self.process_document(&cfg, source.id, document, now).await {
                Ok(mut angle_items) => {
                    items.append(&mut angle_items);
                }
                Err(e) => {
                    tracing::error!(url = %document.url, error = %e, "report document failed");
                }
            }
        }
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "data_report"
    }
}

impl ReportAdapter {
    async fn process_document(
        &self,
        cfg: &ReportConfig,
        source_id: i64,
        document: &ReportDocument,
        now: DateTime<Utc>,
    ) -> Result<Vec<DiscoveredItem>, DiscoverError> {
        let bytes = self.docs.download(&document.url).await?;
        let text = self.extractor.extract_text(&bytes).await?;
        if text.trim().len() < MIN_EXTRACTED_CHARS {
            return Err(DiscoverError::AnalysisFormat(format!(
                "insufficient text extracted from {} ({} chars)",
                document.url,
                text.trim().len()
            )));
        }

        let analysis = self.analyze_document(cfg, &text).await?;
        let items = fan_out_angles(&analysis, &document.url, document.date.as_deref(), cfg, now);

        // The writeback is bookkeeping, not part of the fan-out result.
        self.carry_over(source_id, &analysis, document.date.as_deref())
            .await;

        Ok(items)
    }
}

fn build_analysis_prompt(cfg: &ReportConfig, text: &str) -> String {
    let mut previous_context = String::new();
    if let Some(prev) = &cfg.previous_report_data {
        previous_context = format!(
            "\n\n## Previous Report Data (for month-over-month comparison)\n\
             Report date: {}\n\
             Summary: {}\n\
             Key figures: {}\n",
            prev.report_date.as_deref().unwrap_or("unknown"),
            prev.report_summary.as_deref().unwrap_or("N/A"),
            serde_json::to_string_pretty(&prev.key_figures).unwrap_or_else(|_| "{}".into()),
        );
    }

    let mut doc_text = text.to_string();
    if doc_text.chars().count() > MAX_PROMPT_DOC_CHARS {
        doc_text = doc_text.chars().take(MAX_PROMPT_DOC_CHARS).collect();
        doc_text.push_str("\n\n[... document truncated ...]");
    }

    format!(
        "{prompt}\n{previous_context}\n\n\
         ## Document Text\n\n{doc_text}\n\n\
         ## Response Instructions\n\n\
         Respond with valid JSON only (no markdown fencing). Use this exact structure:\n\
         {{\n\
         \x20 \"report_summary\": \"Brief 2-3 sentence overview of the report\",\n\
         \x20 \"key_figures\": {{\"metric_name\": \"value\"}},\n\
         \x20 \"story_angles\": [\n\
         \x20   {{\n\
         \x20     \"headline\": \"Compelling news headline\",\n\
         \x20     \"summary\": \"2-3 paragraph summary suitable for an article\",\n\
         \x20     \"commodity\": \"relevant commodity or sector\",\n\
         \x20     \"data_points\": [{{\"metric\": \"...\", \"value\": \"...\", \"previous\": \"...\", \"change\": \"...\"}}],\n\
         \x20     \"significance\": \"high|medium|low\",\n\
         \x20     \"angle_type\": \"supply_shift|demand_change|price_impact|trade_flow|policy_change|weather_impact|other\"\n\
         \x20   }}\n\
         \x20 ]\n\
         }}\n\n\
         Return up to {max_angles} story angles, ordered by significance.",
        prompt = cfg.analysis_prompt,
        previous_context = previous_context,
        doc_text = doc_text,
        max_angles = cfg.max_angles,
    )
}

/// One item per story angle. Each gets the document URL with an `angle=N`
/// parameter so the canonicalizer treats angles as distinct candidates while
/// the hash still collides with itself across reruns.
fn fan_out_angles(
    analysis: &ReportAnalysis,
    document_url: &str,
    report_date: Option<&str>,
    cfg: &ReportConfig,
    now: DateTime<Utc>,
) -> Vec<DiscoveredItem> {
    let mut items = Vec::with_capacity(analysis.story_angles.len());
    for (idx, angle) in analysis.story_angles.iter().enumerate() {
        let index = idx + 1;
        let unique_url = match Url::parse(document_url) {
            Ok(mut u) => {
                u.set_fragment(None);
                u.query_pairs_mut()
                    .append_pair("angle", &index.to_string());
                u.to_string()
            }
            Err(_) => format!("{document_url}?angle={index}"),
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("report_name".into(), cfg.report_name.clone().into());
        metadata.insert("publisher".into(), cfg.publisher.clone().into());
        if let Some(date) = report_date {
            metadata.insert("report_date".into(), date.into());
        }
        if let Some(commodity) = &angle.commodity {
            metadata.insert("commodity".into(), commodity.clone().into());
        }
        metadata.insert(
            "data_points".into(),
            serde_json::to_value(&angle.data_points).unwrap_or_default(),
        );
        if let Some(significance) = &angle.significance {
            metadata.insert("significance".into(), significance.clone().into());
        }
        metadata.insert(
            "angle_type".into(),
            serde_json::to_value(angle.angle_type).unwrap_or_default(),
        );
        metadata.insert("angle_index".into(), (index as i64).into());
        metadata.insert("document_url".into(), document_url.into());

        items.push(DiscoveredItem {
            url: unique_url,
            title: Some(angle.headline.clone()),
            snippet: Some(angle.summary.clone()),
            author: Some(cfg.publisher.clone()),
            published_at: Some(now),
            metadata,
        });
    }
    items
}

/// `months_back` months before `now`: the `MMYY` URL token and the `YYYY-MM`
/// period label.
fn month_token(now: DateTime<Utc>, months_back: u32) -> (String, String) {
    let shifted = shift_months(now, months_back);
    let (year, month) = (shifted.year(), shifted.month());
    (
        format!("{:02}{:02}", month, year.rem_euclid(100)),
        format!("{year:04}-{month:02}"),
    )
}

fn shift_months(now: DateTime<Utc>, months_back: u32) -> DateTime<Utc> {
    let total = now.year() * 12 + now.month0() as i32 - months_back as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}

/// Walk a dot-separated field path through a JSON value. A `[]` suffix on a
/// segment iterates the array at that point: `results[].document.url`.
fn extract_path<'a>(value: &'a serde_json::Value, path: &str) -> Vec<&'a serde_json::Value> {
    let mut current = vec![value];
    for segment in path.split('.') {
        let (key, iterate) = match segment.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (segment, false),
        };

        let mut next = Vec::new();
        for v in current {
            let target = if key.is_empty() { Some(v) } else { v.get(key) };
            let Some(target) = target else { continue };
            if iterate {
                if let Some(arr) = target.as_array() {
                    next.extend(arr.iter());
                }
            } else {
                next.push(target);
            }
        }
        current = next;
    }
    current
}
