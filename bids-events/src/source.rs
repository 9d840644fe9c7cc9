//! Source timing tables
//!
//! Locates the per-subject source table by subject-ID prefix and parses it
//! into [`RawTrialRecord`]s. Source tables are headerless delimited text with
//! a fixed positional column layout (see [`SOURCE_COLUMNS`]).

use crate::types::{EventsError, RawTrialRecord, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Positional column layout of a source table
pub const SOURCE_COLUMNS: [&str; 10] = [
    "trial",
    "cue_img",
    "condition_img",
    "trial_type",
    "intrusion_rating",
    "intrusion",
    "RT",
    "onset",
    "duration",
    "run",
];

/// How source tables are found and parsed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOptions {
    /// File extension of source tables, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Skip a leading header row
    #[serde(default)]
    pub has_header: bool,
}

fn default_extension() -> String {
    "tsv".to_string()
}

fn default_delimiter() -> char {
    '\t'
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            delimiter: default_delimiter(),
            has_header: false,
        }
    }
}

impl SourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the file extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Builder method: set the delimiter
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Builder method: skip a header row
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }
}

/// Find the single source table for a subject
///
/// Matches `<dir>/<subject>*.<extension>`. Zero matches is `SourceNotFound`,
/// more than one is `AmbiguousSource`.
pub fn find_source(dir: &Path, subject: &str, options: &SourceOptions) -> Result<PathBuf> {
    let dir_pattern = PathBuf::from(glob::Pattern::escape(&dir.to_string_lossy()));
    let pattern = dir_pattern.join(format!(
        "{}*.{}",
        glob::Pattern::escape(subject),
        glob::Pattern::escape(&options.extension)
    ));
    let pattern = pattern.to_string_lossy();
    log::debug!("Looking up source table with pattern {}", pattern);

    let paths = glob::glob(&pattern).map_err(|e| {
        EventsError::SourceReadError {
            path: dir.to_path_buf(),
            reason: format!("invalid lookup pattern: {}", e),
        }
    })?;

    let mut candidates: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable source candidate: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(EventsError::SourceNotFound {
            subject: subject.to_string(),
            dir: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(EventsError::AmbiguousSource {
            subject: subject.to_string(),
            candidates,
        }),
    }
}

/// Read every record of a source table
pub fn read_source(path: &Path, options: &SourceOptions) -> Result<Vec<RawTrialRecord>> {
    log::debug!("Reading source table: {:?}", path);

    let delimiter = u8::try_from(options.delimiter).map_err(|_| {
        EventsError::SourceReadError {
            path: path.to_path_buf(),
            reason: format!("delimiter {:?} is not a single byte", options.delimiter),
        }
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(options.has_header)
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| read_error(path, e))?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| read_error(path, e))?;
        if row.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let record = parse_row(&row).map_err(|reason| EventsError::SourceReadError {
            path: path.to_path_buf(),
            reason: format!("line {}: {}", line, reason),
        })?;
        records.push(record);
    }

    log::debug!("Read {} source rows from {:?}", records.len(), path);
    Ok(records)
}

/// Keep only the records of one run, failing when there are none
pub fn records_for_run(
    records: &[RawTrialRecord],
    subject: &str,
    run: u32,
    path: &Path,
) -> Result<Vec<RawTrialRecord>> {
    let selected: Vec<RawTrialRecord> = records
        .iter()
        .filter(|record| record.run == run)
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(EventsError::NoRowsForRun {
            subject: subject.to_string(),
            run,
            path: path.to_path_buf(),
        });
    }
    Ok(selected)
}

fn read_error(path: &Path, e: csv::Error) -> EventsError {
    EventsError::SourceReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn parse_row(row: &StringRecord) -> std::result::Result<RawTrialRecord, String> {
    if row.len() != SOURCE_COLUMNS.len() {
        return Err(format!(
            "expected {} columns, found {}",
            SOURCE_COLUMNS.len(),
            row.len()
        ));
    }
    let field = |idx: usize| row.get(idx).unwrap_or("");

    let intrusion = parse_optional_integer(field(5), SOURCE_COLUMNS[5])?
        .map(|v| u8::try_from(v).map_err(|_| format!("intrusion flag out of range: {}", v)))
        .transpose()?;
    let run = parse_integer(field(9), SOURCE_COLUMNS[9])?;

    Ok(RawTrialRecord {
        trial: parse_integer(field(0), SOURCE_COLUMNS[0])?,
        cue_img: field(1).to_string(),
        condition_img: field(2).to_string(),
        trial_type: field(3).to_string(),
        intrusion_rating: parse_optional_float(field(4), SOURCE_COLUMNS[4])?,
        intrusion,
        reaction_time: parse_optional_float(field(6), SOURCE_COLUMNS[6])?,
        onset_ms: parse_float(field(7), SOURCE_COLUMNS[7])?,
        duration_ms: parse_float(field(8), SOURCE_COLUMNS[8])?,
        run: u32::try_from(run).map_err(|_| format!("run index out of range: {}", run))?,
    })
}

fn is_missing(value: &str) -> bool {
    matches!(value, "" | "NaN" | "nan" | "NA" | "N/A")
}

fn parse_optional_float(value: &str, column: &str) -> std::result::Result<Option<f64>, String> {
    if is_missing(value) {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| format!("invalid {} value '{}'", column, value))
}

fn parse_float(value: &str, column: &str) -> std::result::Result<f64, String> {
    parse_optional_float(value, column)?.ok_or_else(|| format!("missing {} value", column))
}

/// Integers exported from spreadsheets often arrive as "1.0"
fn parse_optional_integer(value: &str, column: &str) -> std::result::Result<Option<i64>, String> {
    if is_missing(value) {
        return Ok(None);
    }
    if let Ok(v) = value.parse::<i64>() {
        return Ok(Some(v));
    }
    match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
        _ => Err(format!("invalid {} value '{}'", column, value)),
    }
}

fn parse_integer(value: &str, column: &str) -> std::result::Result<i64, String> {
    parse_optional_integer(value, column)?.ok_or_else(|| format!("missing {} value", column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ROWS: &str = "1\tcue01\tENEG\tr\t3\t1\t1.2\t12000\t500\t1\n\
                        2\tcue02\tENEU\ts\t\t0\tNaN\t16000.0\t500\t1.0\n\
                        3\tcue03\tFN\tsF\t1\t1\t0.9\t4000\t500\t2\n";

    #[test]
    fn test_read_source_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("01_onsets.tsv");
        fs::write(&path, ROWS).unwrap();

        let records = read_source(&path, &SourceOptions::default()).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].trial, 1);
        assert_eq!(records[0].condition_img, "ENEG");
        assert_eq!(records[0].intrusion, Some(1));
        assert_eq!(records[0].reaction_time, Some(1.2));
        assert_eq!(records[0].onset_ms, 12000.0);

        assert_eq!(records[1].intrusion_rating, None);
        assert_eq!(records[1].reaction_time, None);
        assert_eq!(records[1].run, 1);

        assert_eq!(records[2].trial_type, "sF");
        assert_eq!(records[2].run, 2);
    }

    #[test]
    fn test_read_source_with_header_and_commas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("01.csv");
        let content = format!("{}\n1,cue01,ENEG,r,3,1,1.2,12000,500,1\n", SOURCE_COLUMNS.join(","));
        fs::write(&path, content).unwrap();

        let options = SourceOptions::new()
            .with_extension("csv")
            .with_delimiter(',')
            .with_header(true);
        let records = read_source(&path, &options).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].cue_img, "cue01");
    }

    #[test]
    fn test_malformed_rows_are_read_errors() {
        let dir = tempdir().unwrap();

        let short = dir.path().join("short.tsv");
        fs::write(&short, "1\tcue01\tENEG\n").unwrap();
        let err = read_source(&short, &SourceOptions::default()).unwrap_err();
        assert!(matches!(err, EventsError::SourceReadError { .. }));
        assert!(err.to_string().contains("line 1"));

        let bad_onset = dir.path().join("bad.tsv");
        fs::write(&bad_onset, "1\tcue01\tENEG\tr\t3\t1\t1.2\tlate\t500\t1\n").unwrap();
        assert!(matches!(
            read_source(&bad_onset, &SourceOptions::default()),
            Err(EventsError::SourceReadError { .. })
        ));

        let missing = dir.path().join("missing.tsv");
        assert!(matches!(
            read_source(&missing, &SourceOptions::default()),
            Err(EventsError::SourceReadError { .. })
        ));
    }

    #[test]
    fn test_find_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("01_tnt.tsv"), ROWS).unwrap();
        fs::write(dir.path().join("02_tnt.tsv"), ROWS).unwrap();
        fs::write(dir.path().join("02_tnt_retest.tsv"), ROWS).unwrap();
        fs::write(dir.path().join("03_tnt.csv"), ROWS).unwrap();

        let options = SourceOptions::default();
        let found = find_source(dir.path(), "01", &options).unwrap();
        assert_eq!(found, dir.path().join("01_tnt.tsv"));

        match find_source(dir.path(), "02", &options) {
            Err(EventsError::AmbiguousSource { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected AmbiguousSource, got {:?}", other),
        }

        assert!(matches!(
            find_source(dir.path(), "03", &options),
            Err(EventsError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_records_for_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("01_onsets.tsv");
        fs::write(&path, ROWS).unwrap();
        let records = read_source(&path, &SourceOptions::default()).unwrap();

        assert_eq!(records_for_run(&records, "01", 1, &path).unwrap().len(), 2);
        assert!(matches!(
            records_for_run(&records, "01", 3, &path),
            Err(EventsError::NoRowsForRun { run: 3, .. })
        ));
    }
}
