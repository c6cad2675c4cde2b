// src/discover/search.rs
//! Keyword-search adapter: sends the source's keyword string to the news
//! search service and maps each hit to an item.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::NewsSearch;
use crate::discover::Discoverer;
use crate::error::DiscoverError;
use crate::model::{DiscoveredItem, Source};
use crate::text::normalize_opt;

pub struct SearchAdapter {
    search: Arc<dyn NewsSearch>,
}

impl SearchAdapter {
    pub fn new(search: Arc<dyn NewsSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Discoverer for SearchAdapter {
    async fn discover(&self, source: &Source) -> Result<Vec<DiscoveredItem>, DiscoverError> {
        let keywords = source
            .keywords
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DiscoverError::Config("keyword-search source has no keywords".into()))?;

        let hits = self.search.search_news(keywords).await?;

        let items = hits
            .into_iter()
            .map(|hit| {
                let mut metadata = serde_json::Map::new();
                if let Some(name) = &hit.source_name {
                    metadata.insert("source_name".into(), name.clone().into());
                }
                if let Some(thumb) = &hit.thumbnail {
                    metadata.insert("thumbnail".into(), thumb.clone().into());
                }
                DiscoveredItem {
                    url: hit.url,
                    title: normalize_opt(hit.title.as_deref()),
                    snippet: normalize_opt(hit.snippet.as_deref()),
                    author: hit.source_name,
                    published_at: hit.published_at,
                    metadata,
                }
            })
            .collect();
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "keyword_search"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::NewsHit;
    use crate::error::ClientError;
    use crate::model::SourceKind;

    struct FakeSearch {
        hits: Vec<NewsHit>,
    }

    #[async_trait]
    impl NewsSearch for FakeSearch {
        async fn search_news(&self, _query: &str) -> Result<Vec<NewsHit>, ClientError> {
            Ok(self.hits.clone())
        }
    }

    fn source(keywords: Option<&str>) -> Source {
        Source {
            id: 3,
            publication_id: 1,
            name: "grain search".into(),
            kind: SourceKind::KeywordSearch,
            url: None,
            keywords: keywords.map(String::from),
            config: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn maps_hits_to_items() {
        let adapter = SearchAdapter::new(Arc::new(FakeSearch {
            hits: vec![NewsHit {
                url: "https://news.example.com/corn".into(),
                title: Some("Corn &amp; wheat rally".into()),
                snippet: Some("<b>Prices</b> jumped".into()),
                source_name: Some("Ag Daily".into()),
                published_at: None,
                thumbnail: None,
            }],
        }));

        let items = adapter.discover(&source(Some("corn exports"))).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Corn & wheat rally"));
        assert_eq!(items[0].snippet.as_deref(), Some("Prices jumped"));
        assert_eq!(items[0].author.as_deref(), Some("Ag Daily"));
        assert_eq!(
            items[0].metadata.get("source_name").and_then(|v| v.as_str()),
            Some("Ag Daily")
        );
    }

    #[tokio::test]
    async fn missing_keywords_is_a_config_error() {
        let adapter = SearchAdapter::new(Arc::new(FakeSearch { hits: vec![] }));
        assert!(matches!(
            adapter.discover(&source(None)).await.unwrap_err(),
            DiscoverError::Config(_)
        ));
        assert!(matches!(
            adapter.discover(&source(Some("  "))).await.unwrap_err(),
            DiscoverError::Config(_)
        ));
    }
}
