//! Data models shared by the ingestion, dedup and triage stages.
//!
//! - [`FeedSource`]: one configured origin, loaded from the source catalog
//! - [`RawItem`]: a normalized, sanitized item extracted from a source
//! - [`ScoredItem`] / [`AnalyzedItem`]: the item after triage and deep analysis
//! - [`RunReport`]: what a run hands to the report writers
//!
//! Items are identified by their URL. Two URLs that differ only by tracking
//! parameters are two distinct items.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a source is fetched and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An RSS 2.0 or Atom document.
    #[serde(alias = "rss", alias = "atom")]
    Feed,
    /// An HTML listing page whose articles are anchors wrapping headings.
    Web,
}

impl SourceKind {
    /// Value of the `Accept` header sent for this kind of source.
    pub fn accept_header(self) -> &'static str {
        match self {
            SourceKind::Feed => "application/rss+xml, application/atom+xml, application/xml, text/xml",
            SourceKind::Web => "text/html",
        }
    }
}

/// Closed set of topics a source can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SecurityTraining,
    AiDevTools,
    CryptoRwa,
}

impl Category {
    /// Heading used for this category in rendered reports.
    pub fn label(self) -> &'static str {
        match self {
            Category::SecurityTraining => "Security & Training",
            Category::AiDevTools => "AI & Dev Tools",
            Category::CryptoRwa => "Crypto & RWA",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::SecurityTraining => "security_training",
            Category::AiDevTools => "ai_dev_tools",
            Category::CryptoRwa => "crypto_rwa",
        };
        f.write_str(s)
    }
}

/// A configured origin polled once per run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedSource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
    pub category: Category,
}

/// One normalized item. `title` and `url` are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawItem {
    pub source_id: String,
    pub source_name: String,
    pub category: Category,
    /// Stable identity of the item.
    pub url: String,
    pub title: String,
    pub summary: String,
    /// RFC 3339 timestamp; the fetch time when the source gave none.
    pub published_at: String,
}

/// Triage label assigned to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Ignore,
    Watch,
    ActNow,
}

impl Score {
    /// Conservative label used whenever a real classification is unavailable.
    pub const DEFAULT: Score = Score::Watch;

    /// Parse a label as returned by the model, tolerating case and separators.
    pub fn parse(label: &str) -> Option<Score> {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "ignore" => Some(Score::Ignore),
            "watch" => Some(Score::Watch),
            "act_now" | "actnow" => Some(Score::ActNow),
            _ => None,
        }
    }
}

/// Why a [`ScoredItem`] carries the default score instead of a model verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// The whole batch call failed or its response was unusable.
    BatchFailed,
    /// The response had no usable entry for this item.
    Missing,
}

impl Fallback {
    pub fn reason(self) -> &'static str {
        match self {
            Fallback::BatchFailed => "Scoring failed, defaulting to watch",
            Fallback::Missing => "No score returned for this item, defaulting to watch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: RawItem,
    pub score: Score,
    pub score_reason: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback: Option<Fallback>,
}

impl ScoredItem {
    /// Attach the default score to `item`, recording why.
    pub fn fallback(item: RawItem, why: Fallback) -> Self {
        Self {
            item,
            score: Score::DEFAULT,
            score_reason: why.reason().to_string(),
            fallback: Some(why),
        }
    }
}

/// Result of deep analysis on an `act_now` item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnalyzedItem {
    #[serde(flatten)]
    pub scored: ScoredItem,
    pub what_happened: String,
    pub why_it_matters: String,
    pub whats_the_move: String,
    #[serde(default)]
    pub analysis_failed: bool,
}

/// Everything one run produced, as written to the reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub sources_polled: usize,
    pub act_now: Vec<AnalyzedItem>,
    pub watch: Vec<ScoredItem>,
    pub ignore: Vec<ScoredItem>,
}

impl RunReport {
    /// Split scored items by label. `act_now` items must already be analyzed.
    pub fn new(
        generated_at: DateTime<Utc>,
        sources_polled: usize,
        act_now: Vec<AnalyzedItem>,
        rest: Vec<ScoredItem>,
    ) -> Self {
        let (watch, ignore) = rest
            .into_iter()
            .filter(|s| s.score != Score::ActNow)
            .partition(|s| s.score == Score::Watch);
        Self {
            generated_at,
            sources_polled,
            act_now,
            watch,
            ignore,
        }
    }

    /// Nothing worth a report: no urgent and no watch items.
    pub fn is_empty(&self) -> bool {
        self.act_now.is_empty() && self.watch.is_empty()
    }

    /// Items shown in the report.
    pub fn item_count(&self) -> usize {
        self.act_now.len() + self.watch.len()
    }

    /// Distinct sources among the items shown in the report.
    pub fn source_count(&self) -> usize {
        self.act_now
            .iter()
            .map(|a| &a.scored.item.source_name)
            .chain(self.watch.iter().map(|s| &s.item.source_name))
            .unique()
            .count()
    }
}
