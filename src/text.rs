// src/text.rs
//! Title/snippet normalization for discovered items.

use once_cell::sync::OnceCell;

const SNIPPET_CAP: usize = 2000;

/// Normalize text coming out of feeds and search results: decode HTML
/// entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > SNIPPET_CAP {
        out = out.chars().take(SNIPPET_CAP).collect();
    }

    out
}

/// Normalize an optional field, mapping empty results to `None`.
pub fn normalize_opt(s: Option<&str>) -> Option<String> {
    let out = normalize_text(s?);
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        let s = "<p>Corn exports&nbsp;rise <b>12%</b></p>";
        assert_eq!(normalize_text(s), "Corn exports rise 12%");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("  a \n\t b  "), "a b");
    }

    #[test]
    fn empty_option_maps_to_none() {
        assert_eq!(normalize_opt(Some("  <br/>  ")), None);
        assert_eq!(normalize_opt(None), None);
        assert_eq!(normalize_opt(Some("ok")), Some("ok".to_string()));
    }
}
