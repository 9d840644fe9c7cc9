//! BIDS Events CLI Application
//!
//! This is the command-line interface for rebuilding BIDS events files.
//! It uses the bids-events library and adds:
//! - TOML configuration (paths, source format, condition rules)
//! - Subject/run selection
//! - Sequential or parallel batch processing
//! - Summary reports (TXT/JSON)

use anyhow::{bail, Context, Result};
use bids_events::{BidsLayout, EventFiller, EventsLayout, EventsTarget};
use clap::Parser;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

mod config;
mod report;

use report::{BatchReport, UnitOutcome};

/// BIDS Events - Rebuild BIDS events files from source timing tables
#[derive(Parser, Debug)]
#[command(name = "bids-events")]
#[command(about = "Rebuild BIDS events files from source timing tables", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Only process this subject (label without "sub-")
    #[arg(short, long, value_name = "ID")]
    subject: Option<String>,

    /// Only process this run (requires --subject)
    #[arg(short, long, value_name = "N", requires = "subject")]
    run: Option<u32>,

    /// Number of units processed in parallel
    #[arg(short, long, value_name = "N", default_value_t = 1)]
    jobs: usize,

    /// Compute events without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Also write the summary as JSON
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("BIDS Events CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using bids-events library v{}", bids_events::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let app_config = config::load_config(&args.config)?;
    log::debug!("Configuration loaded successfully");

    let filler = EventFiller::new(app_config.transform_config()?)?
        .with_source_options(app_config.source_options())
        .with_dry_run(args.dry_run);

    let layout = BidsLayout::index(&app_config.paths.bids_dir)
        .context("Failed to index BIDS dataset")?;
    let targets = select_targets(&layout, &args)?;
    if targets.is_empty() {
        log::warn!("No events files selected under {:?}", layout.root());
    }

    let outcomes = run_batch(&filler, &targets, &app_config.paths.source_dir, args.jobs)?;
    let report = BatchReport::new(outcomes, args.dry_run);

    if !args.quiet {
        print!("{}", report.render_txt());
    }
    if let Some(summary_path) = &args.summary {
        report.write_json(summary_path)?;
        log::info!("Summary written to {:?}", summary_path);
    }

    check_failures(&report)
}

/// Turn failed units into a non-zero exit status
fn check_failures(report: &BatchReport) -> Result<()> {
    if report.failed() > 0 {
        bail!("{} of {} units failed", report.failed(), report.units.len());
    }
    Ok(())
}

/// Pick the units to process from the layout
fn select_targets(layout: &BidsLayout, args: &Args) -> Result<Vec<EventsTarget>> {
    let Some(subject) = &args.subject else {
        return Ok(layout.event_files());
    };

    let subject = subject.strip_prefix("sub-").unwrap_or(subject);
    let mut targets = layout.targets_for_subject(subject);
    if targets.is_empty() {
        bail!("No events files for subject {} in {:?}", subject, layout.root());
    }
    if let Some(run) = args.run {
        // One file per task shares the same subject/run
        targets.retain(|t| t.key.run == run);
        if targets.is_empty() {
            bail!(
                "No events files for subject {}, run {} in {:?}",
                subject,
                run,
                layout.root()
            );
        }
    }
    Ok(targets)
}

/// Process every unit, sequentially or on a rayon pool
fn run_batch(
    filler: &EventFiller,
    targets: &[EventsTarget],
    source_dir: &Path,
    jobs: usize,
) -> Result<Vec<UnitOutcome>> {
    let process = |target: &EventsTarget| {
        let result = filler.process_unit(target, source_dir);
        UnitOutcome::from_result(&target.key, &target.path, result)
    };

    if jobs <= 1 {
        return Ok(targets.iter().map(process).collect());
    }

    log::info!("Processing {} units with {} jobs", targets.len(), jobs);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to build worker pool")?;
    Ok(pool.install(|| targets.par_iter().map(process).collect()))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bids_events::{DurationPolicy, TransformConfig};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn touch_events(root: &Path, subject: &str, task: &str, run: u32) {
        let func = root.join(format!("sub-{}", subject)).join("func");
        fs::create_dir_all(&func).unwrap();
        fs::write(
            func.join(format!("sub-{}_task-{}_run-{}_events.tsv", subject, task, run)),
            "",
        )
        .unwrap();
    }

    fn layout_with_runs() -> (TempDir, BidsLayout) {
        let dir = tempdir().unwrap();
        for run in [1, 2] {
            touch_events(dir.path(), "01", "tnt", run);
        }
        let layout = BidsLayout::index(dir.path()).unwrap();
        (dir, layout)
    }

    #[test]
    fn test_select_targets() {
        let (_dir, layout) = layout_with_runs();

        let all = Args::parse_from(["bids-events", "--config", "c.toml"]);
        assert_eq!(select_targets(&layout, &all).unwrap().len(), 2);

        let one = Args::parse_from(["bids-events", "-c", "c.toml", "-s", "sub-01", "-r", "2"]);
        let targets = select_targets(&layout, &one).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].key.run, 2);

        let missing = Args::parse_from(["bids-events", "-c", "c.toml", "-s", "01", "-r", "5"]);
        assert!(select_targets(&layout, &missing).is_err());

        let unknown = Args::parse_from(["bids-events", "-c", "c.toml", "-s", "99"]);
        assert!(select_targets(&layout, &unknown).is_err());
    }

    #[test]
    fn test_select_run_across_tasks() {
        let dir = tempdir().unwrap();
        touch_events(dir.path(), "01", "tnt", 1);
        touch_events(dir.path(), "01", "rest", 1);
        touch_events(dir.path(), "01", "tnt", 2);
        let layout = BidsLayout::index(dir.path()).unwrap();

        let args = Args::parse_from(["bids-events", "-c", "c.toml", "-s", "01", "-r", "1"]);
        let targets = select_targets(&layout, &args).unwrap();
        let mut tasks: Vec<_> = targets.iter().filter_map(|t| t.task.clone()).collect();
        tasks.sort();
        assert_eq!(tasks, vec!["rest", "tnt"]);
        assert!(targets.iter().all(|t| t.key.run == 1));
    }

    #[test]
    fn test_run_requires_subject() {
        assert!(Args::try_parse_from(["bids-events", "-c", "c.toml", "-r", "1"]).is_err());
    }

    /// sub-01 run-1 writes, sub-01 run-2 has no source rows, sub-02 has no source
    fn batch_dataset() -> (TempDir, BidsLayout, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let bids = dir.path().join("bids");
        let onsets = dir.path().join("onsets");
        fs::create_dir_all(&onsets).unwrap();

        touch_events(&bids, "01", "tnt", 1);
        touch_events(&bids, "01", "tnt", 2);
        touch_events(&bids, "02", "tnt", 1);
        fs::write(
            onsets.join("01_onsets.tsv"),
            "1\tcue01\tENEG\tr\t3\t1\t1.2\t12000\t500\t1\n",
        )
        .unwrap();

        let layout = BidsLayout::index(&bids).unwrap();
        (dir, layout, onsets)
    }

    fn statuses(outcomes: &[UnitOutcome]) -> Vec<(String, &'static str)> {
        let mut statuses: Vec<(String, &'static str)> = outcomes
            .iter()
            .map(|o| {
                let status = match o {
                    UnitOutcome::Written(_) => "written",
                    UnitOutcome::Skipped { .. } => "skipped",
                    UnitOutcome::Failed { .. } => "failed",
                };
                (o.key().to_string(), status)
            })
            .collect();
        statuses.sort();
        statuses
    }

    #[test]
    fn test_run_batch_sequential_and_parallel_agree() {
        let (_dir, layout, onsets) = batch_dataset();
        let filler =
            EventFiller::new(TransformConfig::new(DurationPolicy::SourceDuration)).unwrap();
        let targets = layout.event_files();

        let expected = vec![
            ("sub-01 run-1".to_string(), "written"),
            ("sub-01 run-2".to_string(), "skipped"),
            ("sub-02 run-1".to_string(), "failed"),
        ];

        for jobs in [1, 2] {
            let outcomes = run_batch(&filler, &targets, &onsets, jobs).unwrap();
            assert_eq!(statuses(&outcomes), expected, "jobs = {}", jobs);

            let report = BatchReport::new(outcomes, false);
            assert_eq!(report.written(), 1);
            assert_eq!(report.skipped(), 1);
            assert_eq!(report.failed(), 1);
            assert!(check_failures(&report).is_err());
        }

        let written = fs::read_to_string(layout.resolve("01", 1).unwrap()).unwrap();
        assert!(written.contains("12.0\t0.5\tnegT\tENEG"));
    }

    #[test]
    fn test_skips_alone_do_not_fail_the_batch() {
        let (_dir, layout, onsets) = batch_dataset();
        let filler = EventFiller::new(TransformConfig::new(DurationPolicy::SourceDuration))
            .unwrap()
            .with_dry_run(true);
        let targets: Vec<_> = layout
            .event_files()
            .into_iter()
            .filter(|t| t.key.subject == "01")
            .collect();

        let report = BatchReport::new(run_batch(&filler, &targets, &onsets, 2).unwrap(), true);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 0);
        assert!(check_failures(&report).is_ok());
    }
}
