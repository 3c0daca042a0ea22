//! Standalone HTML report for one run.
//!
//! ```text
//! Dram                      (run time)
//! Act Now (n)               one card per analyzed item, grouped by category
//! Watch (n)                 one card per watch item, grouped by category
//! n items from m sources
//! ```
//!
//! Every piece of item text is escaped and every link goes through
//! [`sanitize_url`], since all of it comes from third-party feeds.

use crate::models::{AnalyzedItem, Category, RawItem, RunReport, ScoredItem};
use crate::sanitize::{escape_html, sanitize_url};
use crate::utils::report_stamp;
use itertools::Itertools;
use std::error::Error;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

const STYLE: &str = "body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;max-width:700px;margin:0 auto;padding:20px;color:#333}
header{margin-bottom:24px;padding-bottom:16px;border-bottom:1px solid #eee}
header h1{font-size:20px;color:#1a1a2e;margin:0}
.when,.meta,footer{font-size:12px;color:#999}
section{margin-bottom:32px}
section>h2{font-size:14px;text-transform:uppercase;letter-spacing:1px}
.act-now>h2{color:#e63946}
.watch>h2{color:#457b9d}
h3.category{font-size:12px;color:#666;text-transform:uppercase;letter-spacing:.5px}
.card{margin-bottom:20px;padding:16px 20px;background:#f8f9fa;border-radius:4px}
.act-now .card{border-left:4px solid #e63946}
.watch .card{border-left:4px solid #457b9d}
.card a{color:#1a1a2e;text-decoration:none}
.card h4{font-size:12px;color:#e63946;text-transform:uppercase;margin:14px 0 4px}
.card p{margin:0;font-size:14px;line-height:1.6}
.failed{color:#b00}
footer{margin-top:32px;padding-top:16px;border-top:1px solid #eee}";

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn card_heading(out: &mut String, item: &RawItem, level: &str) -> fmt::Result {
    let href = sanitize_url(&item.url);
    writeln!(out, r#"<div class="meta">{}</div>"#, escape_html(&item.source_name))?;
    writeln!(
        out,
        r#"<{level}><a href="{href}">{}</a></{level}>"#,
        escape_html(&item.title)
    )
}

fn act_now_card(out: &mut String, analyzed: &AnalyzedItem) -> fmt::Result {
    let item = &analyzed.scored.item;
    writeln!(out, r#"<article class="card">"#)?;
    card_heading(out, item, "h2")?;
    for (label, text) in [
        ("What happened", &analyzed.what_happened),
        ("Why it matters", &analyzed.why_it_matters),
        ("What's the move", &analyzed.whats_the_move),
    ] {
        writeln!(out, "<h4>{label}</h4>")?;
        writeln!(out, "<p>{}</p>", escape_html(text))?;
    }
    if analyzed.analysis_failed {
        writeln!(out, r#"<p class="failed">Automatic analysis was unavailable for this item.</p>"#)?;
    }
    writeln!(out, r#"<p><a href="{}">Read source</a></p>"#, sanitize_url(&item.url))?;
    writeln!(out, "</article>")
}

fn watch_card(out: &mut String, scored: &ScoredItem) -> fmt::Result {
    writeln!(out, r#"<article class="card">"#)?;
    card_heading(out, &scored.item, "h3")?;
    writeln!(out, "<p>{}</p>", escape_html(&scored.score_reason))?;
    writeln!(out, "</article>")
}

/// Write `items` under per-category subheadings, categories in a fixed order.
fn grouped<T>(
    out: &mut String,
    items: &[T],
    category: impl Fn(&T) -> Category,
    card: impl Fn(&mut String, &T) -> fmt::Result,
) -> fmt::Result {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by_key(|t| category(t));
    let groups = sorted.into_iter().chunk_by(|t| category(t));
    for (cat, group) in &groups {
        writeln!(out, r#"<h3 class="category">{}</h3>"#, escape_html(cat.label()))?;
        for t in group {
            card(out, t)?;
        }
    }
    Ok(())
}

pub fn render(report: &RunReport) -> Result<String, fmt::Error> {
    let when = report.generated_at.format("%A, %B %-d, %Y %H:%M UTC");
    let mut out = String::new();

    writeln!(out, "<!DOCTYPE html>\n<html>\n<head>")?;
    writeln!(out, r#"<meta charset="utf-8">"#)?;
    writeln!(out, r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#)?;
    writeln!(out, "<title>Dram report {}</title>", report.generated_at.format("%Y-%m-%d"))?;
    writeln!(out, "<style>\n{STYLE}\n</style>\n</head>\n<body>")?;
    writeln!(out, "<header><h1>Dram</h1><div class=\"when\">{when}</div></header>")?;

    if !report.act_now.is_empty() {
        writeln!(out, r#"<section class="act-now">"#)?;
        writeln!(out, "<h2>Act Now ({})</h2>", report.act_now.len())?;
        grouped(&mut out, &report.act_now, |a| a.scored.item.category, act_now_card)?;
        writeln!(out, "</section>")?;
    }

    if !report.watch.is_empty() {
        writeln!(out, r#"<section class="watch">"#)?;
        writeln!(out, "<h2>Watch ({})</h2>", report.watch.len())?;
        grouped(&mut out, &report.watch, |s| s.item.category, watch_card)?;
        writeln!(out, "</section>")?;
    }

    writeln!(
        out,
        "<footer>{} from {}</footer>",
        plural(report.item_count(), "item"),
        plural(report.source_count(), "source")
    )?;
    writeln!(out, "</body>\n</html>")?;
    Ok(out)
}

/// Write the report to `<reports_dir>/<stamp>.html` and return its path.
#[instrument(level = "info", skip_all, fields(reports_dir = %reports_dir.display()))]
pub async fn write_html(report: &RunReport, reports_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let html = render(report)?;
    fs::create_dir_all(reports_dir).await?;
    let path = reports_dir.join(format!("{}.html", report_stamp(report.generated_at)));
    fs::write(&path, html).await?;
    info!(path = %path.display(), items = report.item_count(), "Wrote HTML report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;
    use chrono::{TimeZone, Utc};

    fn raw(n: u8, category: Category, source: &str) -> RawItem {
        RawItem {
            source_id: source.to_lowercase(),
            source_name: source.into(),
            category,
            url: format!("https://news.example/{n}"),
            title: format!("Story {n}"),
            summary: "Summary".into(),
            published_at: "2026-02-20T00:00:00+00:00".into(),
        }
    }

    fn watch(item: RawItem, reason: &str) -> ScoredItem {
        ScoredItem {
            item,
            score: Score::Watch,
            score_reason: reason.into(),
            fallback: None,
        }
    }

    fn analyzed(item: RawItem) -> AnalyzedItem {
        AnalyzedItem {
            scored: ScoredItem {
                item,
                score: Score::ActNow,
                score_reason: "Urgent".into(),
                fallback: None,
            },
            what_happened: "A thing happened.".into(),
            why_it_matters: "It matters.".into(),
            whats_the_move: "Do something.".into(),
            analysis_failed: false,
        }
    }

    fn report(act_now: Vec<AnalyzedItem>, watch: Vec<ScoredItem>) -> RunReport {
        RunReport {
            generated_at: Utc.with_ymd_and_hms(2026, 2, 20, 10, 30, 0).unwrap(),
            sources_polled: 5,
            act_now,
            watch,
            ignore: Vec::new(),
        }
    }

    #[test]
    fn untrusted_text_is_escaped_and_links_neutralized() {
        let mut hostile = raw(1, Category::CryptoRwa, "Evil <b>Feed</b>");
        hostile.title = r#"<script>alert("x")</script>"#.into();
        hostile.url = "javascript:alert(1)".into();
        let html = render(&report(Vec::new(), vec![watch(hostile, "Reason & <more>")])).unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Evil &lt;b&gt;Feed&lt;/b&gt;"));
        assert!(html.contains("Reason &amp; &lt;more&gt;"));
        assert!(!html.contains("javascript:"));
        assert!(html.contains(r##"href="#blocked""##));
    }

    #[test]
    fn sections_and_footer_reflect_contents() {
        let html = render(&report(
            vec![analyzed(raw(1, Category::AiDevTools, "Lab"))],
            vec![
                watch(raw(2, Category::SecurityTraining, "Lab"), "Trend"),
                watch(raw(3, Category::AiDevTools, "Wire"), "Context"),
            ],
        ))
        .unwrap();

        assert!(html.contains("Act Now (1)"));
        assert!(html.contains("Watch (2)"));
        assert!(html.contains("What happened"));
        assert!(html.contains("Do something."));
        assert!(html.contains("3 items from 2 sources"));
        assert!(html.contains("Friday, February 20, 2026 10:30 UTC"));
        // categories follow their declared order inside a section
        let watch_section = &html[html.find("Watch (2)").unwrap()..];
        let security = watch_section.find("Security &amp; Training").unwrap();
        let ai = watch_section.find("AI &amp; Dev Tools").unwrap();
        assert!(security < ai);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let html = render(&report(Vec::new(), vec![watch(raw(1, Category::CryptoRwa, "Desk"), "r")])).unwrap();
        assert!(!html.contains("Act Now"));
        assert!(html.contains("1 item from 1 source"));
    }

    #[test]
    fn failed_analysis_is_flagged() {
        let mut item = analyzed(raw(1, Category::AiDevTools, "Lab"));
        item.analysis_failed = true;
        let html = render(&report(vec![item], Vec::new())).unwrap();
        assert!(html.contains(r#"class="failed""#));
    }

    #[tokio::test]
    async fn writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let path = write_html(&report(Vec::new(), vec![watch(raw(1, Category::CryptoRwa, "D"), "r")]), &reports)
            .await
            .unwrap();
        assert_eq!(path, reports.join("2026-02-20T10-30.html"));
        assert!(std::fs::read_to_string(path).unwrap().starts_with("<!DOCTYPE html>"));
    }
}
