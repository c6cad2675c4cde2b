// src/dedup.rs
//! Duplicate checks guarding candidate creation.
//!
//! Matching is intentionally conservative: an exact hash lookup for existing
//! candidates, a case-insensitive substring match against published-content
//! URLs. A missed duplicate just surfaces as a second reviewable candidate;
//! wrongly skipping a genuinely new item is the failure to avoid.

use crate::canonical::canonicalize;
use crate::error::StoreError;
use crate::store::Store;

/// Does a candidate with this URL hash already exist for the publication?
pub async fn is_duplicate_candidate(
    store: &dyn Store,
    publication_id: i64,
    url_hash: &str,
) -> Result<bool, StoreError> {
    store.candidate_exists(publication_id, url_hash).await
}

/// Has this URL already been turned into published content for the
/// publication (possibly discovered via a different source)?
pub async fn is_already_published(
    store: &dyn Store,
    publication_id: i64,
    url: &str,
) -> Result<bool, StoreError> {
    let Ok(canonical) = canonicalize(url) else {
        return Ok(false);
    };
    let needle = canonical.url.to_lowercase();
    let published = store.published_urls(publication_id).await?;
    Ok(published.iter().any(|u| u.to_lowercase().contains(&needle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Publication;
    use crate::store::InMemoryStore;

    fn publication(id: i64) -> Publication {
        Publication {
            id,
            name: "wire".into(),
            domain: None,
            topic_description: None,
            reader_personas: None,
            active: true,
            last_research_run: None,
            require_review: false,
            research_api_key: None,
        }
    }

    #[tokio::test]
    async fn published_match_is_case_insensitive_substring() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        store.seed_published_url(1, "HTTPS://Example.com/markets/corn-outlook?src=1");

        // Tracking params on the rediscovered URL don't defeat the match.
        assert!(is_already_published(
            &store,
            1,
            "https://example.com/markets/corn-outlook?src=1&utm_source=feed"
        )
        .await
        .unwrap());

        assert!(
            !is_already_published(&store, 1, "https://example.com/markets/wheat-outlook")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn published_match_is_scoped_to_the_publication() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        store.seed_publication(publication(2));
        store.seed_published_url(1, "https://example.com/story");

        assert!(is_already_published(&store, 1, "https://example.com/story")
            .await
            .unwrap());
        assert!(!is_already_published(&store, 2, "https://example.com/story")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unparseable_url_is_not_a_duplicate() {
        let store = InMemoryStore::new();
        store.seed_publication(publication(1));
        assert!(!is_already_published(&store, 1, ":::").await.unwrap());
    }
}
