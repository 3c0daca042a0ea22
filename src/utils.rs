//! Small helpers shared across the pipeline.

use chrono::{DateTime, Utc};
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Shorten `s` to at most `max` bytes (on a char boundary) for log output.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// True when a JSON parse failed because the input ended early, which is
/// what a model response cut off at its token limit looks like.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// File stem for the reports of a run started at `now`, e.g. `2026-02-20T10-30`.
pub fn report_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M").to_string()
}

/// Create `path` if needed and check that a file can be written into it.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Data directory is writable");
    Ok(())
}
