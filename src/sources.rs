//! The source catalog: which feeds and listing pages a run polls.
//!
//! Loaded once from YAML at start-up and passed down by value.

use crate::models::FeedSource;
use serde::Deserialize;
use std::collections::HashSet;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

pub const DEFAULT_SOURCES_PATH: &str = "config/sources.yaml";

#[derive(Debug, Deserialize)]
struct Catalog {
    sources: Vec<FeedSource>,
}

/// Read and validate the catalog at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_sources(path: &Path) -> Result<Vec<FeedSource>, Box<dyn Error>> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read source catalog {}: {e}", path.display()))?;
    let sources = parse_sources(&raw)?;
    info!(count = sources.len(), "Loaded source catalog");
    Ok(sources)
}

pub fn parse_sources(yaml: &str) -> Result<Vec<FeedSource>, Box<dyn Error>> {
    let catalog: Catalog = serde_yaml::from_str(yaml)?;
    validate(&catalog.sources)?;
    Ok(catalog.sources)
}

fn validate(sources: &[FeedSource]) -> Result<(), Box<dyn Error>> {
    if sources.is_empty() {
        return Err("source catalog is empty".into());
    }
    let mut ids = HashSet::new();
    for source in sources {
        if source.id.trim().is_empty() {
            return Err("source with an empty id".into());
        }
        if !ids.insert(source.id.as_str()) {
            return Err(format!("duplicate source id `{}`", source.id).into());
        }
        if source.name.trim().is_empty() {
            return Err(format!("source `{}` has an empty name", source.id).into());
        }
        let url = Url::parse(&source.url)
            .map_err(|e| format!("source `{}` has an invalid url: {e}", source.id))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("source `{}` url must be http(s)", source.id).into());
        }
    }
    Ok(())
}
