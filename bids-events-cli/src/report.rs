//! Batch summary report
//!
//! Collects the outcome of every subject/run unit and renders it as a TXT
//! summary for the terminal or as JSON for downstream tooling.

use anyhow::{Context, Result};
use bids_events::{RunKey, UnitReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a single unit
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UnitOutcome {
    Written(UnitReport),
    Skipped {
        key: RunKey,
        path: PathBuf,
        reason: String,
    },
    Failed {
        key: RunKey,
        path: PathBuf,
        error: String,
    },
}

impl UnitOutcome {
    /// Classify a unit result, logging it with subject, run and path
    pub fn from_result(key: &RunKey, path: &Path, result: bids_events::Result<UnitReport>) -> Self {
        match result {
            Ok(report) => UnitOutcome::Written(report),
            Err(e) if e.is_skip() => {
                log::warn!("Skipping {} ({:?}): {}", key, path, e);
                UnitOutcome::Skipped {
                    key: key.clone(),
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                log::error!("Failed {} ({:?}): {}", key, path, e);
                UnitOutcome::Failed {
                    key: key.clone(),
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn key(&self) -> &RunKey {
        match self {
            UnitOutcome::Written(report) => &report.key,
            UnitOutcome::Skipped { key, .. } | UnitOutcome::Failed { key, .. } => key,
        }
    }
}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub units: Vec<UnitOutcome>,
}

impl BatchReport {
    pub fn new(mut units: Vec<UnitOutcome>, dry_run: bool) -> Self {
        units.sort_by(|a, b| a.key().cmp(b.key()));
        Self {
            generated_at: Utc::now(),
            dry_run,
            units,
        }
    }

    pub fn written(&self) -> usize {
        self.count(|u| matches!(u, UnitOutcome::Written(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|u| matches!(u, UnitOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|u| matches!(u, UnitOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(u)).count()
    }

    /// Render the TXT summary
    pub fn render_txt(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "═══════════════════════════════════════════════");
        let _ = writeln!(out, "  BIDS Events - Summary");
        let _ = writeln!(out, "═══════════════════════════════════════════════");
        let _ = writeln!(out, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if self.dry_run {
            let _ = writeln!(out, "Mode:      dry run (nothing written)");
        }
        let _ = writeln!(
            out,
            "Units:     {} written, {} skipped, {} failed\n",
            self.written(),
            self.skipped(),
            self.failed()
        );

        for unit in &self.units {
            match unit {
                UnitOutcome::Written(report) => {
                    let _ = writeln!(
                        out,
                        "  ✓ {:<20} {:>3}/{:<3} trials matched, {:>3} events",
                        report.key.to_string(),
                        report.matched_trials,
                        report.trials,
                        report.events_written
                    );
                }
                UnitOutcome::Skipped { key, reason, .. } => {
                    let _ = writeln!(out, "  - {:<20} skipped: {}", key.to_string(), reason);
                }
                UnitOutcome::Failed { key, error, .. } => {
                    let _ = writeln!(out, "  ✗ {:<20} failed: {}", key.to_string(), error);
                }
            }
        }
        out
    }

    /// Write the JSON summary
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        fs::write(path, json).with_context(|| format!("Failed to write summary: {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bids_events::EventsError;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn written(subject: &str, run: u32) -> UnitOutcome {
        UnitOutcome::Written(UnitReport {
            key: RunKey::new(subject, run),
            source: PathBuf::from("onsets/01.tsv"),
            destination: PathBuf::from("sub-01_task-tnt_run-1_events.tsv"),
            trials: 10,
            matched_trials: 8,
            events_written: 16,
            per_condition: BTreeMap::from([("negT".to_string(), 8)]),
            dry_run: false,
        })
    }

    #[test]
    fn test_outcome_classification() {
        let key = RunKey::new("01", 3);
        let path = Path::new("sub-01_task-tnt_run-3_events.tsv");

        let skipped = UnitOutcome::from_result(
            &key,
            path,
            Err(EventsError::NoRowsForRun {
                subject: "01".into(),
                run: 3,
                path: PathBuf::from("01.tsv"),
            }),
        );
        assert!(matches!(skipped, UnitOutcome::Skipped { .. }));

        let failed = UnitOutcome::from_result(
            &key,
            path,
            Err(EventsError::DestinationWriteError {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }),
        );
        match failed {
            UnitOutcome::Failed { error, .. } => assert!(error.contains("denied")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_counts_and_txt() {
        let report = BatchReport::new(
            vec![
                written("02", 1),
                UnitOutcome::Failed {
                    key: RunKey::new("03", 1),
                    path: PathBuf::from("x"),
                    error: "No source table found".into(),
                },
                written("01", 1),
            ],
            false,
        );
        assert_eq!(report.written(), 2);
        assert_eq!(report.skipped(), 0);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.units[0].key(), &RunKey::new("01", 1));

        let txt = report.render_txt();
        assert!(txt.contains("2 written, 0 skipped, 1 failed"));
        assert!(txt.contains("sub-03 run-1"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        BatchReport::new(vec![written("01", 1)], true)
            .write_json(&path)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["units"][0]["status"], "written");
        assert_eq!(value["units"][0]["events_written"], 16);
    }
}
