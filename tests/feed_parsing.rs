// tests/feed_parsing.rs
//! Feed adapter against a realistic RSS fixture.

use newsdesk_research::discover::feed::parse_feed;

const FIXTURE: &str = include_str!("fixtures/grain_wire_rss.xml");

#[test]
fn fixture_parses_with_entries_in_order() {
    let items = parse_feed(FIXTURE).unwrap();
    assert_eq!(items.len(), 2, "the linkless entry is dropped");

    let first = &items[0];
    assert_eq!(
        first.url,
        "https://wire.example.com/2026/02/19/corn-exports-high?utm_source=rss&utm_medium=feed"
    );
    assert_eq!(
        first.title.as_deref(),
        Some("Corn exports hit a three-year high")
    );
    assert_eq!(
        first.snippet.as_deref(),
        Some("Weekly inspections topped 1.6 million tonnes.")
    );
    assert!(first.published_at.is_some());

    let second = &items[1];
    assert_eq!(
        second.snippet.as_deref(),
        Some("Spot barge rates fell 8% week over week.")
    );
}

#[test]
fn full_content_is_captured_for_free_enrichment() {
    let items = parse_feed(FIXTURE).unwrap();
    let content = items[0]
        .metadata
        .get("rss_full_content")
        .and_then(|v| v.as_str())
        .expect("content:encoded captured");
    assert!(content.contains("strongest pace since 2023"));

    // The second entry has no embedded content.
    assert!(!items[1].metadata.contains_key("rss_full_content"));
}

#[test]
fn feed_metadata_rides_along() {
    let items = parse_feed(FIXTURE).unwrap();
    assert_eq!(
        items[0].metadata.get("feed_title").and_then(|v| v.as_str()),
        Some("Grain Trade Wire")
    );
    let tags = items[0]
        .metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(tags.len(), 2);
}
