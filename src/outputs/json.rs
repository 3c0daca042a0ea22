//! Machine-readable companion to the HTML report.
//!
//! Same stem as the HTML file, holding every item of the run by label:
//! ```text
//! <data_dir>/reports/
//! ├── 2026-02-20T10-30.html
//! └── 2026-02-20T10-30.json
//! ```

use crate::models::RunReport;
use crate::utils::report_stamp;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialize `report` to `<reports_dir>/<stamp>.json` and return its path.
#[instrument(level = "info", skip_all, fields(reports_dir = %reports_dir.display()))]
pub async fn write_json(report: &RunReport, reports_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    if let Err(e) = fs::create_dir_all(reports_dir).await {
        error!(error = %e, "Failed to create reports dir");
        return Err(e.into());
    }

    let path = reports_dir.join(format!("{}.json", report_stamp(report.generated_at)));
    fs::write(&path, json).await?;
    info!(
        path = %path.display(),
        act_now = report.act_now.len(),
        watch = report.watch.len(),
        ignore = report.ignore.len(),
        "Wrote JSON report"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyzedItem, Category, Fallback, RawItem, ScoredItem};
    use chrono::{TimeZone, Utc};

    fn raw(n: u8) -> RawItem {
        RawItem {
            source_id: "lab".into(),
            source_name: "Lab".into(),
            category: Category::AiDevTools,
            url: format!("https://lab.example/{n}"),
            title: format!("Post {n}"),
            summary: "S".into(),
            published_at: "2026-02-20T00:00:00+00:00".into(),
        }
    }

    #[tokio::test]
    async fn writes_every_label() {
        let dir = tempfile::tempdir().unwrap();
        let analyzed = AnalyzedItem {
            scored: ScoredItem {
                item: raw(0),
                score: crate::models::Score::ActNow,
                score_reason: "Now".into(),
                fallback: None,
            },
            what_happened: "W".into(),
            why_it_matters: "Y".into(),
            whats_the_move: "M".into(),
            analysis_failed: false,
        };
        let report = RunReport::new(
            Utc.with_ymd_and_hms(2026, 2, 20, 10, 30, 0).unwrap(),
            3,
            vec![analyzed],
            vec![
                ScoredItem::fallback(raw(1), Fallback::BatchFailed),
                ScoredItem {
                    item: raw(2),
                    score: crate::models::Score::Ignore,
                    score_reason: "Noise".into(),
                    fallback: None,
                },
            ],
        );

        let path = write_json(&report, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("2026-02-20T10-30.json"));

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sources_polled"], 3);
        assert_eq!(value["generated_at"], "2026-02-20T10:30:00Z");
        assert_eq!(value["act_now"][0]["url"], "https://lab.example/0");
        assert_eq!(value["act_now"][0]["whats_the_move"], "M");
        assert_eq!(value["watch"][0]["fallback"], "batch_failed");
        assert_eq!(value["ignore"][0]["score_reason"], "Noise");
    }
}
