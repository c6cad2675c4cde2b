// src/url_dates.rs
//! Publish-date extraction from URL path patterns.
//!
//! News sites embed dates in article paths (`/2025/02/19/slug`,
//! `/2025-02-19-slug`, `/2025/february/slug`). When a feed or search result
//! carries no timestamp, this is the cheapest fallback before giving the
//! item a neutral recency score. Dates up to 10 years old are returned;
//! callers apply their own max-age policy.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_AGE_DAYS: i64 = 3650;

static RE_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/(\d{1,2})/(\d{1,2})/").unwrap());
static RE_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})-(\d{2})-(\d{2})-").unwrap());
static RE_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/(\d{1,2})/").unwrap());
static RE_NAMED_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)/(\d{4})/(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)(?:[/-]|$)",
    )
    .unwrap()
});
static RE_YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/(?:[^0-9/])").unwrap());

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_ascii_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn plausible(dt: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if dt <= now && (now - dt).num_days() < MAX_AGE_DAYS {
        Some(dt)
    } else {
        None
    }
}

fn make_date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
}

/// Extract a publish date from a URL path, trying the most specific pattern
/// first.
pub fn date_from_url(url: &str) -> Option<DateTime<Utc>> {
    date_from_url_at(url, Utc::now())
}

pub fn date_from_url_at(url: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    // /YYYY/MM/DD/
    if let Some(m) = RE_FULL.captures(url) {
        if let Some(dt) = make_date(
            m[1].parse().ok()?,
            m[2].parse().ok()?,
            m[3].parse().ok()?,
        ) {
            if let Some(dt) = plausible(dt, now) {
                return Some(dt);
            }
        }
    }

    // /YYYY-MM-DD-slug (press release style)
    if let Some(m) = RE_HYPHEN.captures(url) {
        if let Some(dt) = make_date(
            m[1].parse().ok()?,
            m[2].parse().ok()?,
            m[3].parse().ok()?,
        ) {
            if let Some(dt) = plausible(dt, now) {
                return Some(dt);
            }
        }
    }

    // /YYYY/MM/
    if let Some(m) = RE_MONTH.captures(url) {
        if let Some(dt) = make_date(m[1].parse().ok()?, m[2].parse().ok()?, 1) {
            if let Some(dt) = plausible(dt, now) {
                return Some(dt);
            }
        }
    }

    // /YYYY/february/ or /YYYY/jan-13-2014
    if let Some(m) = RE_NAMED_MONTH.captures(url) {
        if let Some(month) = month_number(&m[2]) {
            if let Some(dt) = make_date(m[1].parse().ok()?, month, 1) {
                if let Some(dt) = plausible(dt, now) {
                    return Some(dt);
                }
            }
        }
    }

    // /YYYY/slug — assume January 1st of that year
    if let Some(m) = RE_YEAR_ONLY.captures(url) {
        let year: i32 = m[1].parse().ok()?;
        if (2000..=now.date_naive().year()).contains(&year) {
            if let Some(dt) = make_date(year, 1, 1) {
                if let Some(dt) = plausible(dt, now) {
                    return Some(dt);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn full_date_path() {
        let dt = date_from_url_at("https://site.com/2026/02/19/corn-exports", now()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 2, 19));
    }

    #[test]
    fn hyphenated_press_release() {
        let dt = date_from_url_at("https://site.com/news/2025-11-03-statement", now()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 11, 3));
    }

    #[test]
    fn year_month_path() {
        let dt = date_from_url_at("https://site.com/2026/01/market-brief", now()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 1, 1));
    }

    #[test]
    fn named_month_path() {
        let dt = date_from_url_at("https://site.com/2025/february/outlook", now()).unwrap();
        assert_eq!((dt.year(), dt.month()), (2025, 2));
    }

    #[test]
    fn year_only_path() {
        let dt = date_from_url_at("https://site.com/2024/grain-shipping-review", now()).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
    }

    #[test]
    fn future_dates_are_ignored() {
        assert!(date_from_url_at("https://site.com/2027/01/05/preview", now()).is_none());
    }

    #[test]
    fn ancient_dates_are_ignored() {
        assert!(date_from_url_at("https://site.com/2009/05/01/archive", now()).is_none());
    }

    #[test]
    fn no_date_in_path() {
        assert!(date_from_url_at("https://site.com/markets/corn", now()).is_none());
    }
}
