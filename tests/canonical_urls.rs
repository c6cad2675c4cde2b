// tests/canonical_urls.rs
//! Canonical-identity properties the deduplication scheme depends on.

use newsdesk_research::canonical::canonicalize;

#[test]
fn canonicalization_is_idempotent() {
    let inputs = [
        "https://Example.com/Markets/Corn/?utm_source=x&b=2&a=1#frag",
        "http://a.com/p",
        "https://a.com:8443/x?z=9",
        "https://a.com/x/?angle=2",
    ];
    for input in inputs {
        let once = canonicalize(input).unwrap();
        let twice = canonicalize(&once.url).unwrap();
        assert_eq!(once, twice, "not idempotent for {input}");
    }
}

#[test]
fn query_parameter_order_is_irrelevant() {
    let a = canonicalize("https://a.com/p?b=2&a=1").unwrap();
    let b = canonicalize("https://a.com/p?a=1&b=2").unwrap();
    assert_eq!(a.url, b.url);
    assert_eq!(a.hash, b.hash);
}

#[test]
fn tracking_params_stripped_but_disambiguators_preserved() {
    let c = canonicalize("https://A.com/x/?utm_source=y&angle=2").unwrap();
    assert!(c.url.contains("angle=2"));
    assert!(!c.url.contains("utm_source"));
    assert_eq!(c.url, "https://a.com/x?angle=2");
}

#[test]
fn all_tracking_params_are_stripped() {
    let c = canonicalize(
        "https://a.com/p?utm_source=1&utm_medium=2&utm_campaign=3&utm_term=4\
         &utm_content=5&fbclid=6&gclid=7&ref=8&mc_cid=9&mc_eid=10&keep=yes",
    )
    .unwrap();
    assert_eq!(c.url, "https://a.com/p?keep=yes");
}

#[test]
fn case_and_trailing_slash_do_not_change_identity() {
    let a = canonicalize("HTTPS://Example.COM/story/").unwrap();
    let b = canonicalize("https://example.com/story").unwrap();
    assert_eq!(a.hash, b.hash);
}

#[test]
fn different_logical_urls_hash_differently() {
    let a = canonicalize("https://a.com/story?angle=1").unwrap();
    let b = canonicalize("https://a.com/story?angle=2").unwrap();
    let c = canonicalize("https://a.com/story").unwrap();
    assert_ne!(a.hash, b.hash);
    assert_ne!(a.hash, c.hash);
    assert_ne!(b.hash, c.hash);
}
