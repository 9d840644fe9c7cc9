//! Per subject/run transformation
//!
//! [`EventFiller`] is the entry point of the library. It ties together the
//! source lookup, the classifier, the expander and the writer for one
//! subject/run unit at a time. Units share no state, so a driver may process
//! them in any order or in parallel.

use crate::config::TransformConfig;
use crate::expander::expand;
use crate::layout::EventsTarget;
use crate::source::{find_source, read_source, records_for_run, SourceOptions};
use crate::types::{OutputEvent, RawTrialRecord, Result, RunKey};
use crate::writer::{render_table, sort_events, write_events};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Outcome of one successfully processed unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub key: RunKey,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Trials of the run found in the source table
    pub trials: usize,
    /// Trials that matched at least one condition
    pub matched_trials: usize,
    /// Rows written, rating events included
    pub events_written: usize,
    /// Matched trial count per condition name
    pub per_condition: BTreeMap<String, usize>,
    /// True if the table was computed but not written
    pub dry_run: bool,
}

/// Rebuilds BIDS events files from source timing tables
pub struct EventFiller {
    config: TransformConfig,
    source_options: SourceOptions,
    dry_run: bool,
}

impl EventFiller {
    /// Create a filler, validating the configuration up front
    pub fn new(config: TransformConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source_options: SourceOptions::default(),
            dry_run: false,
        })
    }

    /// Builder method: set how source tables are found and parsed
    pub fn with_source_options(mut self, options: SourceOptions) -> Self {
        self.source_options = options;
        self
    }

    /// Builder method: compute tables without writing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Classify, expand and sort the trials of one run
    ///
    /// Records of other runs are ignored. Events are emitted in trial order,
    /// then rule order, primary before rating, and then stably sorted by
    /// onset.
    pub fn transform(&self, records: &[RawTrialRecord], run: u32) -> Result<Vec<OutputEvent>> {
        Ok(self.transform_counted(records, run)?.0)
    }

    fn transform_counted(
        &self,
        records: &[RawTrialRecord],
        run: u32,
    ) -> Result<(Vec<OutputEvent>, BTreeMap<String, usize>, usize)> {
        let mut events = Vec::new();
        let mut per_condition: BTreeMap<String, usize> = BTreeMap::new();
        let mut matched_trials = 0;

        for record in records.iter().filter(|r| r.run == run) {
            let matched = if self.config.strict {
                self.config.rule_set.classify_strict(record)?
            } else {
                self.config.rule_set.classify(record)
            };

            if matched.is_empty() {
                log::trace!(
                    "Trial {} ({} / {}) matches no condition",
                    record.trial,
                    record.condition_img,
                    record.trial_type
                );
                continue;
            }
            if matched.len() > 1 {
                log::warn!(
                    "Trial {} matches {} conditions, emitting each",
                    record.trial,
                    matched.len()
                );
            }

            matched_trials += 1;
            for rule in matched {
                *per_condition.entry(rule.name.clone()).or_insert(0) += 1;
                events.extend(expand(record, rule, &self.config));
            }
        }

        sort_events(&mut events);
        Ok((events, per_condition, matched_trials))
    }

    /// Render the table for already loaded records without touching disk
    pub fn render(&self, records: &[RawTrialRecord], run: u32) -> Result<Vec<u8>> {
        let events = self.transform(records, run)?;
        Ok(render_table(&events, self.config.mode)?)
    }

    /// Process one subject/run unit end to end
    ///
    /// Looks up the subject's source table in `source_dir`, selects the
    /// target's run, and replaces the target events file.
    pub fn process_unit(&self, target: &EventsTarget, source_dir: &Path) -> Result<UnitReport> {
        let RunKey { subject, run } = &target.key;
        log::info!(
            "Processing subject {} - run {} - file: {:?}",
            subject,
            run,
            target.path
        );

        let source = find_source(source_dir, subject, &self.source_options)?;
        let all_records = read_source(&source, &self.source_options)?;
        let run_records = records_for_run(&all_records, subject, *run, &source)?;

        let (mut events, per_condition, matched_trials) =
            self.transform_counted(&run_records, *run)?;

        for (condition, count) in &per_condition {
            log::debug!("  {}: {} trials", condition, count);
        }

        if self.dry_run {
            log::info!(
                "Dry run: {} events for subject {}, run {} not written to {:?}",
                events.len(),
                subject,
                run,
                target.path
            );
        } else {
            write_events(&target.path, &mut events, self.config.mode)?;
            log::info!(
                "Replaced events file for subject {}, run {} at {:?}",
                subject,
                run,
                target.path
            );
        }

        Ok(UnitReport {
            key: target.key.clone(),
            source,
            destination: target.path.clone(),
            trials: run_records.len(),
            matched_trials,
            events_written: events.len(),
            per_condition,
            dry_run: self.dry_run,
        })
    }
}
