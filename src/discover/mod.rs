// src/discover/mod.rs
//! Discovery adapters: one per source kind, all behind the same capability
//! trait. Dispatch is a match on the source's kind tag — the competitor
//! variant is the news-site adapter noticing the kind and stamping a flag,
//! not a separate type.

pub mod feed;
pub mod report;
pub mod search;
pub mod site;

use async_trait::async_trait;

use crate::error::DiscoverError;
use crate::model::{DiscoveredItem, Source, SourceKind};

/// Produce a finite list of discovered items from one source configuration.
/// May fail with a configuration error (fatal for the source this run) or a
/// service error (retried on the next run); either is contained per source.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, source: &Source) -> Result<Vec<DiscoveredItem>, DiscoverError>;

    fn name(&self) -> &'static str;
}

/// Source-kind → adapter dispatch used by the pipeline.
pub trait AdapterRegistry: Send + Sync {
    /// `None` means the kind has no discovery behavior (house content).
    fn adapter_for(&self, kind: SourceKind) -> Option<&dyn Discoverer>;
}

/// Production registry wiring the four adapters.
pub struct Adapters {
    pub feed: feed::FeedAdapter,
    pub site: site::SiteAdapter,
    pub search: search::SearchAdapter,
    pub report: report::ReportAdapter,
}

impl AdapterRegistry for Adapters {
    fn adapter_for(&self, kind: SourceKind) -> Option<&dyn Discoverer> {
        match kind {
            SourceKind::RssFeed => Some(&self.feed),
            SourceKind::NewsSite | SourceKind::Competitor => Some(&self.site),
            SourceKind::KeywordSearch => Some(&self.search),
            SourceKind::DataReport => Some(&self.report),
            SourceKind::HouseContent => None,
        }
    }
}
