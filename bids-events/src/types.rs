//! Core types for the event reconstruction library
//!
//! This module defines the records read from source timing tables, the events
//! written back into BIDS `*_events.tsv` files, and the library error type.
//! Nothing here carries state between subject/run units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, EventsError>;

/// Trial type label used for the synthetic rating events
pub const RATING_TRIAL_TYPE: &str = "rating";

/// One row of a source timing table
///
/// Times are in milliseconds from run start, as recorded by the stimulus
/// presentation software.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrialRecord {
    /// Sequence index of the trial
    pub trial: i64,
    /// Cue image shown before the stimulus (passed through, never matched)
    pub cue_img: String,
    /// Stimulus/category code, e.g. "ENEG", "ENEU", "FN"
    pub condition_img: String,
    /// Short trial code, e.g. "r", "s", "sF", "rF"
    pub trial_type: String,
    /// Raw intrusion rating (passed through, never matched)
    pub intrusion_rating: Option<f64>,
    /// Binary intrusion flag; `None` when the cell was empty
    pub intrusion: Option<u8>,
    /// Response time in the unit supplied by the source
    pub reaction_time: Option<f64>,
    /// Trial onset, milliseconds from run start
    pub onset_ms: f64,
    /// Display duration in milliseconds
    pub duration_ms: f64,
    /// Run index this trial belongs to
    pub run: u32,
}

/// One row of a regenerated BIDS events table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    /// Onset in seconds from run start
    pub onset_s: f64,
    /// Duration in seconds; empty cell when unknown
    pub duration_s: Option<f64>,
    /// Condition label, or `"rating"` for secondary events
    pub trial_type: String,
    /// Response time in seconds (response-time output mode only)
    pub response_time: Option<f64>,
    /// Copy of the source `condition_img`
    pub stim_file: String,
}

impl OutputEvent {
    /// True if this is a synthetic rating event
    pub fn is_rating(&self) -> bool {
        self.trial_type == RATING_TRIAL_TYPE
    }
}

/// Errors that can occur while rebuilding event files
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error("No source table found for subject {subject} in {dir:?}")]
    SourceNotFound { subject: String, dir: PathBuf },

    #[error("Ambiguous source for subject {subject}: {} candidates ({candidates:?})", .candidates.len())]
    AmbiguousSource {
        subject: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Failed to read source table {path:?}: {reason}")]
    SourceReadError { path: PathBuf, reason: String },

    #[error("No rows for subject {subject}, run {run} in {path:?}")]
    NoRowsForRun {
        subject: String,
        run: u32,
        path: PathBuf,
    },

    #[error("Failed to write events file {path:?}: {source}")]
    DestinationWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Trial {trial} matches more than one condition: {rules:?}")]
    AmbiguousMatch { trial: i64, rules: Vec<String> },

    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Layout error: {0}")]
    LayoutError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EventsError {
    /// True for conditions the batch driver reports as a skip, not a failure
    pub fn is_skip(&self) -> bool {
        matches!(self, EventsError::NoRowsForRun { .. })
    }
}

/// Identifies one subject/run unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    /// Subject label without the `sub-` prefix
    pub subject: String,
    /// Run index (1 when the dataset has no run entity)
    pub run: u32,
}

impl RunKey {
    pub fn new(subject: impl Into<String>, run: u32) -> Self {
        Self {
            subject: subject.into(),
            run,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{} run-{}", self.subject, self.run)
    }
}
