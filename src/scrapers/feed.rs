//! RSS 2.0 and Atom extraction.
//!
//! RSS is tried first. Atom is only consulted when the document has no
//! usable `<item>`, so a payload carrying both dialects is read as RSS.

use super::ParsedEntry;
use crate::markup::{
    extract_attr, extract_blocks, extract_tag, opening_tags, or_else_nonempty, strip_html,
};
use crate::sanitize::{MAX_SUMMARY_LENGTH, truncate_chars};

/// Entries of an RSS or Atom document, in document order.
pub fn parse_feed(xml: &str) -> Vec<ParsedEntry> {
    let entries = parse_rss_items(xml);
    if !entries.is_empty() {
        return entries;
    }
    parse_atom_entries(xml)
}

fn finish(title: String, link: String, summary: String, published: String) -> Option<ParsedEntry> {
    let title = strip_html(&title);
    let link = strip_html(&link);
    if title.is_empty() || link.is_empty() {
        return None;
    }
    let summary = strip_html(&summary);
    Some(ParsedEntry {
        title,
        link,
        summary: truncate_chars(&summary, MAX_SUMMARY_LENGTH).into_owned(),
        published: published.trim().to_string(),
    })
}

fn parse_rss_items(xml: &str) -> Vec<ParsedEntry> {
    extract_blocks(xml, "item")
        .into_iter()
        .filter_map(|item| {
            finish(
                extract_tag(item, "title"),
                or_else_nonempty(extract_tag(item, "link"), || {
                    extract_attr(item, "link", "href")
                }),
                or_else_nonempty(extract_tag(item, "description"), || {
                    extract_tag(item, "content:encoded")
                }),
                or_else_nonempty(extract_tag(item, "pubDate"), || {
                    extract_tag(item, "dc:date")
                }),
            )
        })
        .collect()
}

fn parse_atom_entries(xml: &str) -> Vec<ParsedEntry> {
    extract_blocks(xml, "entry")
        .into_iter()
        .filter_map(|entry| {
            finish(
                extract_tag(entry, "title"),
                or_else_nonempty(preferred_link(entry), || extract_tag(entry, "link")),
                or_else_nonempty(extract_tag(entry, "summary"), || {
                    extract_tag(entry, "content")
                }),
                or_else_nonempty(extract_tag(entry, "published"), || {
                    extract_tag(entry, "updated")
                }),
            )
        })
        .collect()
}

/// `href` of the entry's best `<link>`: `rel="alternate"`, then one with no
/// `rel` at all, then any other.
fn preferred_link(entry: &str) -> String {
    let mut best: Option<(u8, String)> = None;
    for tag in opening_tags(entry, "link") {
        let href = extract_attr(tag, "link", "href");
        if href.is_empty() {
            continue;
        }
        let rel = extract_attr(tag, "link", "rel");
        let rank = if rel.eq_ignore_ascii_case("alternate") {
            0
        } else if rel.is_empty() {
            1
        } else {
            2
        };
        if best.as_ref().is_none_or(|(r, _)| rank < *r) {
            best = Some((rank, href));
        }
    }
    best.map(|(_, href)| href).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_items_with_empty_link_are_dropped() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Channel</title>
  <item>
    <title>First &amp; best</title>
    <link>https://news.example/1</link>
    <description>&lt;p&gt;One&lt;/p&gt;</description>
    <pubDate>Fri, 20 Feb 2026 10:30:00 GMT</pubDate>
  </item>
  <item>
    <title><![CDATA[Second <em>story</em>]]></title>
    <link>https://news.example/2</link>
    <content:encoded><![CDATA[<p>Two</p>]]></content:encoded>
    <dc:date>2026-02-21T08:00:00Z</dc:date>
  </item>
  <item>
    <title>Third</title>
    <link/>
  </item>
</channel></rss>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "First & best");
        assert_eq!(entries[0].link, "https://news.example/1");
        assert_eq!(entries[0].published, "Fri, 20 Feb 2026 10:30:00 GMT");
        assert_eq!(entries[1].title, "Second story");
        assert_eq!(entries[1].summary, "Two");
        assert_eq!(entries[1].published, "2026-02-21T08:00:00Z");
    }

    #[test]
    fn rss_link_may_come_from_href() {
        let xml = r#"<item><title>T</title><link href="https://news.example/h"/></item>"#;
        assert_eq!(parse_feed(xml)[0].link, "https://news.example/h");
    }

    #[test]
    fn long_summary_is_truncated() {
        let body = "word ".repeat(200);
        let xml = format!("<item><title>T</title><link>https://a.example</link><description>{body}</description></item>");
        let entry = &parse_feed(&xml)[0];
        assert_eq!(entry.summary.chars().count(), MAX_SUMMARY_LENGTH + 3);
        assert!(entry.summary.ends_with("..."));
    }

    #[test]
    fn atom_prefers_alternate_link() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title type="html">Atom &amp; <b>post</b></title>
    <link rel="self" href="https://blog.example/self"/>
    <link rel="alternate" type="text/html" href="https://blog.example/post"/>
    <summary>Short</summary>
    <updated>2026-02-20T00:00:00Z</updated>
  </entry>
  <entry>
    <title>Bare</title>
    <link rel="edit" href="https://blog.example/edit"/>
    <link href="https://blog.example/bare"/>
    <content>Long</content>
    <published>2026-02-19T00:00:00Z</published>
    <updated>2026-02-20T00:00:00Z</updated>
  </entry>
</feed>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Atom & post");
        assert_eq!(entries[0].link, "https://blog.example/post");
        assert_eq!(entries[0].summary, "Short");
        assert_eq!(entries[0].published, "2026-02-20T00:00:00Z");
        assert_eq!(entries[1].link, "https://blog.example/bare");
        assert_eq!(entries[1].summary, "Long");
        assert_eq!(entries[1].published, "2026-02-19T00:00:00Z");
    }

    #[test]
    fn rss_wins_when_both_dialects_present() {
        let xml = r#"<root>
  <item><title>From RSS</title><link>https://a.example/rss</link></item>
  <entry><title>From Atom</title><link href="https://a.example/atom"/></entry>
</root>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "From RSS");
    }

    #[test]
    fn falls_back_to_atom_when_items_are_unusable() {
        let xml = r#"<root>
  <item><title></title><link>https://a.example/rss</link></item>
  <entry><title>From Atom</title><link href="https://a.example/atom"/></entry>
</root>"#;
        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://a.example/atom");
    }

    #[test]
    fn garbage_never_panics() {
        for junk in [
            "",
            "not xml at all",
            "<rss><channel><item><title>unterminated",
            "<feed><entry><title>x</title><link href=\"unterminated",
            "<item><title><![CDATA[</title></item>",
        ] {
            let _ = parse_feed(junk);
        }
        assert!(parse_feed("<rss><channel><item><title>unterminated").is_empty());
    }
}
