//! Command-line interface.
//!
//! Every option can also come from a `DRAM_*` environment variable, which is
//! convenient when the binary runs from cron or a systemd timer.

use crate::ingest::{DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
use crate::sources::DEFAULT_SOURCES_PATH;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Poll news feeds and listing pages, drop what was already seen, and
/// triage the rest with an LLM.
///
/// # Examples
///
/// ```sh
/// # Normal run with the bundled catalog and ~/.dram
/// dram
///
/// # See what is new without touching the seen-set or the model
/// dram --dry-run --data-dir /tmp/dram
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source catalog (YAML)
    #[arg(short, long, env = "DRAM_SOURCES", default_value = DEFAULT_SOURCES_PATH)]
    pub sources: PathBuf,

    /// Directory for seen.json and reports [default: ~/.dram]
    #[arg(short, long, env = "DRAM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to the model config.yaml [default: awful_aj's config dir]
    #[arg(short, long, env = "DRAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chat template used to score items
    #[arg(long, env = "DRAM_TRIAGE_TEMPLATE", default_value = "dram_triage")]
    pub triage_template: String,

    /// Chat template used to analyze act-now items
    #[arg(long, env = "DRAM_ANALYSIS_TEMPLATE", default_value = "dram_analysis")]
    pub analysis_template: String,

    /// Per-source request timeout, in seconds
    #[arg(long, env = "DRAM_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Maximum sources fetched at once
    #[arg(long, env = "DRAM_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Stop after dedup: no seen-set update, no model calls, no report
    #[arg(long, env = "DRAM_DRY_RUN")]
    pub dry_run: bool,
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// `--data-dir`, else `~/.dram`, else `./.dram` when no home is known.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".dram"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["dram"]);
        assert_eq!(cli.sources, PathBuf::from("config/sources.yaml"));
        assert_eq!(cli.triage_template, "dram_triage");
        assert_eq!(cli.analysis_template, "dram_analysis");
        assert_eq!(cli.timeout(), Duration::from_secs(10));
        assert_eq!(cli.concurrency, 16);
        assert!(!cli.dry_run);
        assert!(cli.data_dir().ends_with(".dram"));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "dram",
            "-s",
            "/etc/dram/sources.yaml",
            "--data-dir",
            "/var/lib/dram",
            "--config",
            "/etc/dram/config.yaml",
            "--timeout-secs",
            "3",
            "--concurrency",
            "4",
            "--dry-run",
        ]);
        assert_eq!(cli.sources, PathBuf::from("/etc/dram/sources.yaml"));
        assert_eq!(cli.data_dir(), PathBuf::from("/var/lib/dram"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dram/config.yaml")));
        assert_eq!(cli.timeout(), Duration::from_secs(3));
        assert_eq!(cli.concurrency, 4);
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_rejects_bad_numbers() {
        assert!(Cli::try_parse_from(["dram", "--concurrency", "many"]).is_err());
    }
}
