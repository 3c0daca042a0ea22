//! Sanitization of untrusted feed text.
//!
//! Every string taken from a feed passes through [`sanitize_title`] or
//! [`sanitize_summary`] before it reaches an LLM prompt, and through
//! [`escape_html`] / [`sanitize_url`] before it reaches a rendered report.

use std::borrow::Cow;
use url::Url;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_SUMMARY_LENGTH: usize = 500;

/// Marker appended to text cut by [`truncate_chars`].
pub const ELLIPSIS: &str = "...";

/// Remove control characters, keeping `\n` and `\t`.
///
/// Covers C0, DEL and C1, which can hide instructions from a human reader
/// while still being fed to the model.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Keep at most `max` characters, appending [`ELLIPSIS`] when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &text[..byte_idx], ELLIPSIS)),
    }
}

fn sanitize_capped(text: &str, max: usize) -> String {
    let clean = strip_control_chars(text);
    truncate_chars(clean.trim(), max).into_owned()
}

pub fn sanitize_title(title: &str) -> String {
    sanitize_capped(title, MAX_TITLE_LENGTH)
}

pub fn sanitize_summary(summary: &str) -> String {
    sanitize_capped(summary, MAX_SUMMARY_LENGTH)
}

/// Escape `& < > " '` for interpolation into HTML text or attributes.
pub fn escape_html(unsafe_text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(unsafe_text)
}

/// Make a URL safe for an `href`.
///
/// Only absolute `http`/`https` URLs survive, in their parsed form; anything
/// else (script-capable schemes included) becomes `#blocked`. Parsing strips
/// control characters and embedded tabs the same way a browser does, so
/// `"\u{1}javascript:"` or `"java\tscript:"` cannot slip past the scheme check.
pub fn sanitize_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            escape_html(parsed.as_str()).into_owned()
        }
        _ => "#blocked".to_string(),
    }
}
