//! Fetching sources and turning them into items.
//!
//! A [`Fetcher`] issues one GET per source and never fails: a timeout, a
//! connection error or a non-2xx status is logged and becomes an empty result,
//! so one broken source cannot take the run down with it.
//!
//! [`fetch_all`] fans the fetcher out over the whole catalog. Every source is
//! awaited to completion (success or failure) before the flattened items are
//! returned; at most `concurrency` requests are in flight at once.

use crate::models::{FeedSource, RawItem};
use crate::scrapers;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use reqwest::header::ACCEPT;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONCURRENCY: usize = 16;

/// User agent sent with every request.
pub fn user_agent() -> String {
    format!("Dram/{} (news aggregator)", env!("CARGO_PKG_VERSION"))
}

/// HTTP client for sources, with a per-request timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a fetcher whose requests (including the body read) time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, Box<dyn Error>> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch one source and normalize what it returns.
    ///
    /// Never errors; every failure mode is an empty vector plus a warning.
    #[instrument(level = "info", skip_all, fields(source = %source.id))]
    pub async fn fetch_source(&self, source: &FeedSource) -> Vec<RawItem> {
        let body = match self.fetch_body(source).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %source.id, url = %source.url, error = %e, "Fetch failed; skipping source");
                return Vec::new();
            }
        };

        let fetched_at = Utc::now();
        let entries = scrapers::parse_document(source, &body);
        let items = scrapers::normalize(source, entries, fetched_at);
        debug!(source = %source.id, bytes = body.len(), count = items.len(), "Parsed source");
        items
    }

    async fn fetch_body(&self, source: &FeedSource) -> Result<String, Box<dyn Error>> {
        let response = self
            .client
            .get(&source.url)
            .header(ACCEPT, source.kind.accept_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}").into());
        }
        // Declared charsets are ignored; bodies are read as UTF-8.
        let bytes = response.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Fetch every source and flatten the results.
///
/// Sources that fail contribute nothing; they do not cancel or delay the
/// others. Items keep their per-source extraction order.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), concurrency = concurrency))]
pub async fn fetch_all(fetcher: &Fetcher, sources: &[FeedSource], concurrency: usize) -> Vec<RawItem> {
    let per_source: Vec<Vec<RawItem>> = stream::iter(sources)
        .map(|source| fetcher.fetch_source(source))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let empty = per_source.iter().filter(|items| items.is_empty()).count();
    let items: Vec<RawItem> = per_source.into_iter().flatten().collect();
    info!(
        count = items.len(),
        sources = sources.len(),
        empty_sources = empty,
        "Fetched all sources"
    );
    items
}
