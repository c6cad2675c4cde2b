// src/discover/site.rs
//! News-site adapter: map the site for article links, falling back to a
//! rendered-page link scrape when the map comes back thin. Competitor
//! sources run the identical algorithm and just get a metadata flag.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::PageMapper;
use crate::discover::Discoverer;
use crate::error::DiscoverError;
use crate::model::{DiscoveredItem, Source, SourceKind};

const MAP_LIMIT: u32 = 50;
/// Below this many mapped links the map result is suspect (blocked page,
/// JS-only nav) and the scrape fallback kicks in.
const MIN_MAPPED_LINKS: usize = 5;

pub struct SiteAdapter {
    mapper: Arc<dyn PageMapper>,
}

impl SiteAdapter {
    pub fn new(mapper: Arc<dyn PageMapper>) -> Self {
        Self { mapper }
    }
}

#[async_trait]
impl Discoverer for SiteAdapter {
    async fn discover(&self, source: &Source) -> Result<Vec<DiscoveredItem>, DiscoverError> {
        let url = source
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| DiscoverError::Config("news-site source has no URL".into()))?;

        let mut items = Vec::new();
        let map_result = self
            .mapper
            .map_links(url, source.keywords.as_deref(), MAP_LIMIT)
            .await;
        let map_err = match map_result {
            Ok(links) => {
                items.extend(links.into_iter().filter(|l| !l.url.is_empty()).map(|l| {
                    DiscoveredItem {
                        url: l.url,
                        title: l.title,
                        snippet: l.description,
                        ..Default::default()
                    }
                }));
                None
            }
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "site map failed, trying scrape fallback");
                Some(e)
            }
        };

        if items.len() < MIN_MAPPED_LINKS {
            match self.mapper.scrape_links(url).await {
                Ok(links) => {
                    items.extend(
                        links
                            .into_iter()
                            .filter(|l| !l.is_empty())
                            .map(DiscoveredItem::new),
                    );
                }
                Err(e) => {
                    // Only a hard failure when the map produced nothing either.
                    if items.is_empty() {
                        return Err(DiscoverError::Service(map_err.unwrap_or(e)));
                    }
                    tracing::warn!(source = %source.name, error = %e, "scrape fallback failed");
                }
            }
        }

        if source.kind == SourceKind::Competitor {
            for item in &mut items {
                item.metadata.insert("is_competitor".into(), true.into());
            }
        }

        Ok(items)
    }

    fn name(&self) -> &'static str {
        "news_site"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MappedLink, ScrapedPage};
    use crate::error::ClientError;
    use std::sync::Mutex;

    struct FakeMapper {
        mapped: Result<Vec<MappedLink>, ()>,
        scraped: Result<Vec<String>, ()>,
        scrape_calls: Mutex<usize>,
    }

    #[async_trait]
    impl PageMapper for FakeMapper {
        async fn map_links(
            &self,
            _url: &str,
            _search: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<MappedLink>, ClientError> {
            self.mapped
                .clone()
                .map_err(|_| ClientError::Network("map down".into()))
        }

        async fn scrape_links(&self, _url: &str) -> Result<Vec<String>, ClientError> {
            *self.scrape_calls.lock().unwrap() += 1;
            self.scraped
                .clone()
                .map_err(|_| ClientError::Network("scrape down".into()))
        }

        async fn scrape_page(&self, _url: &str) -> Result<ScrapedPage, ClientError> {
            unimplemented!("not used by the site adapter")
        }
    }

    fn source(kind: SourceKind) -> Source {
        Source {
            id: 7,
            publication_id: 1,
            name: "rival".into(),
            kind,
            url: Some("https://rival.example.com".into()),
            keywords: None,
            config: None,
            active: true,
        }
    }

    fn links(n: usize) -> Vec<MappedLink> {
        (0..n)
            .map(|i| MappedLink {
                url: format!("https://rival.example.com/article-{i}"),
                title: None,
                description: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn healthy_map_skips_the_fallback() {
        let mapper = Arc::new(FakeMapper {
            mapped: Ok(links(10)),
            scraped: Ok(vec!["https://rival.example.com/extra".into()]),
            scrape_calls: Mutex::new(0),
        });
        let adapter = SiteAdapter::new(mapper.clone());

        let items = adapter.discover(&source(SourceKind::NewsSite)).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(*mapper.scrape_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn thin_map_triggers_scrape_fallback() {
        let mapper = Arc::new(FakeMapper {
            mapped: Ok(links(2)),
            scraped: Ok(vec![
                "https://rival.example.com/a".into(),
                "https://rival.example.com/b".into(),
            ]),
            scrape_calls: Mutex::new(0),
        });
        let adapter = SiteAdapter::new(mapper.clone());

        let items = adapter.discover(&source(SourceKind::NewsSite)).await.unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(*mapper.scrape_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn competitor_kind_stamps_every_item() {
        let mapper = Arc::new(FakeMapper {
            mapped: Ok(links(6)),
            scraped: Ok(vec![]),
            scrape_calls: Mutex::new(0),
        });
        let adapter = SiteAdapter::new(mapper);

        let items = adapter
            .discover(&source(SourceKind::Competitor))
            .await
            .unwrap();
        assert!(items
            .iter()
            .all(|i| i.metadata.get("is_competitor") == Some(&true.into())));
    }

    #[tokio::test]
    async fn both_paths_down_is_a_service_error() {
        let mapper = Arc::new(FakeMapper {
            mapped: Err(()),
            scraped: Err(()),
            scrape_calls: Mutex::new(0),
        });
        let adapter = SiteAdapter::new(mapper);

        let err = adapter
            .discover(&source(SourceKind::NewsSite))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::Service(_)));
    }

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let mapper = Arc::new(FakeMapper {
            mapped: Ok(vec![]),
            scraped: Ok(vec![]),
            scrape_calls: Mutex::new(0),
        });
        let adapter = SiteAdapter::new(mapper);
        let mut src = source(SourceKind::NewsSite);
        src.url = None;

        assert!(matches!(
            adapter.discover(&src).await.unwrap_err(),
            DiscoverError::Config(_)
        ));
    }
}
