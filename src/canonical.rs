// src/canonical.rs
//! URL canonicalization: the stable identity used for deduplication.
//!
//! Two adapters (or two runs) must produce the identical hash for the
//! identical logical URL, so the canonical form is deterministic: lowercase
//! scheme/host, one trailing slash stripped, fragment dropped, tracking
//! parameters removed, and the surviving query pairs sorted before hashing.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Query parameters that carry no identity, only attribution.
pub const TRACKING_PARAMS: [&str; 10] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "mc_cid",
    "mc_eid",
];

#[derive(Debug, Error)]
#[error("unparseable URL `{raw}`: {reason}")]
pub struct CanonicalError {
    raw: String,
    reason: String,
}

/// Normalized URL identity: the canonical string plus its SHA-256 hex hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    pub url: String,
    pub hash: String,
}

/// Canonicalize a raw URL. Scheme-less inputs (common in scraped link lists)
/// are retried with an `https://` prefix before giving up.
pub fn canonicalize(raw: &str) -> Result<CanonicalUrl, CanonicalError> {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) if trimmed.contains('.') => {
            Url::parse(&format!("https://{trimmed}")).map_err(|e| CanonicalError {
                raw: raw.to_string(),
                reason: e.to_string(),
            })?
        }
        Err(e) => {
            return Err(CanonicalError {
                raw: raw.to_string(),
                reason: e.to_string(),
            })
        }
    };

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

    let mut path = parsed.path().to_string();
    if path.ends_with('/') {
        path.pop();
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let key = k.to_ascii_lowercase();
            !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut canonical = format!("{scheme}://{host}");
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{port}"));
    }
    canonical.push_str(&path);
    if !pairs.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();
        canonical.push('?');
        canonical.push_str(&query);
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut hash = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut hash, "{:02x}", b);
    }

    Ok(CanonicalUrl {
        url: canonical,
        hash,
    })
}
