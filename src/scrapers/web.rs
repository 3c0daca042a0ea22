//! Article discovery on HTML listing pages.
//!
//! Listing pages such as `https://www.example.com/news` tend to render each
//! article as an anchor wrapping a heading:
//!
//! ```text
//! <time>Feb 20, 2026</time>
//! <a href="/news/some-slug"><h3>Title</h3></a>
//! ```
//!
//! An anchor counts as an article only if its resolved URL lives on the
//! listing's host, strictly below the listing's path. That rules out the
//! listing itself and the site navigation.

use super::ParsedEntry;
use crate::markup::strip_html;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

static RE_ANCHOR_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s(?:[^>]*\s)?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#).unwrap()
});
static RE_ANCHOR_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</a\s*>").unwrap());
static RE_ANCHOR_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<a\s").unwrap());
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h[1-6](?:\s[^>]*)?>(.*?)</h[1-6]\s*>").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b")
        .unwrap()
});

/// How far back from an anchor to look for its date.
const DATE_LOOKBEHIND_CHARS: usize = 300;

/// Articles linked from the listing page at `base_url`, in page order.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<ParsedEntry> {
    let Ok(base) = Url::parse(base_url) else {
        debug!(%base_url, "Listing URL does not parse; nothing to resolve against");
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut pos = 0;
    while let Some(open) = RE_ANCHOR_OPEN.captures_at(html, pos) {
        let Some(whole) = open.get(0) else { break };
        let Some(close) = RE_ANCHOR_CLOSE.find_at(html, whole.end()) else {
            break;
        };
        // An unclosed anchor ends where the next one starts.
        if let Some(next) = RE_ANCHOR_START
            .find_at(html, whole.end())
            .filter(|m| m.start() < close.start())
        {
            pos = next.start();
            continue;
        }
        pos = close.end();

        let href = open
            .get(1)
            .or_else(|| open.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        let inner = &html[whole.end()..close.start()];
        let Some(heading) = RE_HEADING.captures(inner) else {
            continue;
        };
        let title = strip_html(&heading[1]);
        if title.is_empty() || href.is_empty() {
            continue;
        }
        let Some(link) = resolve_article_url(&base, href) else {
            continue;
        };

        entries.push(ParsedEntry {
            title,
            link,
            summary: String::new(),
            published: date_before(html, whole.start()).unwrap_or_default(),
        });
    }
    entries
}

/// Absolute URL for `href` if it points strictly below the listing.
fn resolve_article_url(base: &Url, href: &str) -> Option<String> {
    let resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") || resolved.host() != base.host() {
        return None;
    }
    let prefix = format!("{}/", base.path().trim_end_matches('/'));
    let path = resolved.path();
    if path.starts_with(&prefix) && path != prefix {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// Closest "Month Day, Year" in the text just before byte offset `at`.
fn date_before(html: &str, at: usize) -> Option<String> {
    let head = &html[..at];
    let start = head
        .char_indices()
        .rev()
        .nth(DATE_LOOKBEHIND_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    RE_DATE
        .find_iter(&head[start..])
        .last()
        .map(|m| m.as_str().to_string())
}
