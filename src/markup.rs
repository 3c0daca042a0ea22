//! Tolerant extraction primitives over raw markup.
//!
//! Feeds in the wild are RSS, Atom, or something in between, and a fair share
//! of them are not well-formed. Instead of a strict document parser this module
//! offers a handful of pattern-based lookups that return an empty string when
//! the thing asked for is not there. Nothing here panics or returns an error;
//! absence is the only failure signal, and callers chain fallbacks with
//! [`or_else_nonempty`].
//!
//! Tag names are matched case-insensitively and must be followed by
//! whitespace or `>`, so asking for `title` never matches `<titles>`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

static PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Compile `pattern` once per process. `None` only if the pattern is invalid.
fn pattern(pattern: String) -> Option<Regex> {
    let mut cache = match PATTERNS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(re) = cache.get(&pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(&pattern).ok()?;
    cache.insert(pattern, re.clone());
    Some(re)
}

/// Opening tag that is not self-closing, e.g. `<title>` or `<link rel="x">`.
fn open_tag(tag: &str) -> String {
    format!(r"<{}(?:\s*|\s[^>]*[^/>])>", regex::escape(tag))
}

fn close_tag(tag: &str) -> String {
    format!(r"</{}\s*>", regex::escape(tag))
}

/// Inner text of the first `<tag>…</tag>`, CDATA-unwrapped, trimmed.
///
/// An occurrence wrapping a CDATA section wins over any plain one.
pub fn extract_tag(markup: &str, tag: &str) -> String {
    let cdata = pattern(format!(
        r"(?is){}\s*<!\[CDATA\[(.*?)\]\]>\s*{}",
        open_tag(tag),
        close_tag(tag)
    ));
    if let Some(caps) = cdata.as_ref().and_then(|re| re.captures(markup)) {
        return caps[1].trim().to_string();
    }

    pattern(format!(r"(?is){}(.*?){}", open_tag(tag), close_tag(tag)))
        .and_then(|re| re.captures(markup).map(|caps| caps[1].trim().to_string()))
        .unwrap_or_default()
}

/// Value of `attr` on the first `<tag …>` that carries it, trimmed.
pub fn extract_attr(markup: &str, tag: &str, attr: &str) -> String {
    pattern(format!(
        r#"(?is)<{}\s(?:[^>]*\s)?{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(tag),
        regex::escape(attr)
    ))
    .and_then(|re| re.captures(markup))
    .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
    .map(|m| m.as_str().trim().to_string())
    .unwrap_or_default()
}

/// Every complete `<tag>…</tag>` block, in document order.
///
/// An unterminated block is simply not returned.
pub fn extract_blocks<'a>(markup: &'a str, tag: &str) -> Vec<&'a str> {
    match pattern(format!(
        r"(?is)<{}(?:\s[^>]*)?>.*?{}",
        regex::escape(tag),
        close_tag(tag)
    )) {
        Some(re) => re.find_iter(markup).map(|m| m.as_str()).collect(),
        None => Vec::new(),
    }
}

/// Every opening `<tag …>` (self-closing or not), in document order.
pub fn opening_tags<'a>(markup: &'a str, tag: &str) -> Vec<&'a str> {
    match pattern(format!(r"(?is)<{}(?:\s[^>]*)?/?>", regex::escape(tag))) {
        Some(re) => re.find_iter(markup).map(|m| m.as_str()).collect(),
        None => Vec::new(),
    }
}

/// `value` if it is non-empty, otherwise whatever `fallback` produces.
pub fn or_else_nonempty(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() { fallback() } else { value }
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Remove tags, decode the core entities and collapse whitespace.
///
/// Only `&amp; &lt; &gt; &quot; &#39; &nbsp;` are decoded, `&amp;` first.
pub fn strip_html(html: &str) -> String {
    let text = RE_TAGS.replace_all(html, "");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    RE_WS.replace_all(&text, " ").trim().to_string()
}
