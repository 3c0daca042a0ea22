//! Report writers.
//!
//! - [`html`]: the human-readable report
//! - [`json`]: the same run as JSON
//!
//! Both land in `<data_dir>/reports/` under a shared timestamp stem.

pub mod html;
pub mod json;

use crate::models::RunReport;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const REPORTS_DIR: &str = "reports";

/// Write both reports, logging failures instead of returning them.
///
/// By the time reports are written the seen-set is already persisted, so a
/// failed write loses the report but never causes items to be reprocessed.
pub async fn write_reports(report: &RunReport, data_dir: &Path) -> Vec<PathBuf> {
    let dir = data_dir.join(REPORTS_DIR);
    let mut written = Vec::new();

    match html::write_html(report, &dir).await {
        Ok(path) => written.push(path),
        Err(e) => error!(error = %e, "Failed to write HTML report"),
    }
    match json::write_json(report, &dir).await {
        Ok(path) => written.push(path),
        Err(e) => error!(error = %e, "Failed to write JSON report"),
    }

    info!(files = written.len(), "Reports written");
    written
}
