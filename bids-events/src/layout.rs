//! BIDS dataset layout
//!
//! Finds the `*_events.tsv` files of a dataset and resolves a subject/run to
//! the file that should be overwritten. The transformation itself only sees
//! the [`EventsLayout`] trait, so other dataset layouts can be plugged in.

use crate::types::{EventsError, Result, RunKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Suffix and extension of BIDS events files
pub const EVENTS_SUFFIX: &str = "_events.tsv";

/// Top-level dataset directories that never hold raw events files;
/// hidden directories are skipped at any depth
const IGNORED_DIRS: [&str; 5] = ["derivatives", "sourcedata", "code", "stimuli", "models"];

/// One events file of the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsTarget {
    pub key: RunKey,
    /// Task label, if the file name carries one
    pub task: Option<String>,
    pub path: PathBuf,
}

/// Resolves subject/run units to destination events files
pub trait EventsLayout {
    /// Every events file known to the layout, in a stable order
    fn event_files(&self) -> Vec<EventsTarget>;

    /// Destination file for a subject/run
    fn resolve(&self, subject: &str, run: u32) -> Result<PathBuf>;
}

/// Parse `key-value` entities from a BIDS file name
///
/// Returns `None` if the name is not an events file or has no subject.
pub fn parse_entities(file_name: &str) -> Option<(RunKey, Option<String>)> {
    let stem = file_name.strip_suffix(EVENTS_SUFFIX)?;

    let entities: HashMap<&str, &str> = stem
        .split('_')
        .filter_map(|part| part.split_once('-'))
        .collect();

    let subject = entities.get("sub").filter(|s| !s.is_empty())?;
    // Run defaults to 1 when the dataset has a single run per task
    let run = match entities.get("run") {
        Some(value) => value.parse::<u32>().ok()?,
        None => 1,
    };
    let task = entities.get("task").map(|t| t.to_string());

    Some((RunKey::new(*subject, run), task))
}

/// Index of the events files in a BIDS dataset directory
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
    targets: Vec<EventsTarget>,
}

impl BidsLayout {
    /// Walk a dataset and index its events files
    pub fn index(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(EventsError::LayoutError(format!(
                "dataset root {:?} is not a directory",
                root
            )));
        }

        log::info!("Indexing BIDS dataset: {:?}", root);

        let mut targets = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| !is_ignored(entry));

        for entry in walker {
            let entry = entry.map_err(|e| EventsError::LayoutError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            match parse_entities(name) {
                Some((key, task)) => targets.push(EventsTarget {
                    key,
                    task,
                    path: entry.path().to_path_buf(),
                }),
                None if name.ends_with(EVENTS_SUFFIX) => {
                    log::warn!("Ignoring events file without subject/run entities: {:?}", entry.path());
                }
                None => {}
            }
        }

        targets.sort_by(|a, b| a.path.cmp(&b.path));
        log::info!("Found {} events files", targets.len());

        Ok(Self {
            root: root.to_path_buf(),
            targets,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Events files of one subject
    pub fn targets_for_subject(&self, subject: &str) -> Vec<EventsTarget> {
        self.targets
            .iter()
            .filter(|t| t.key.subject == subject)
            .cloned()
            .collect()
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.depth() == 1 && IGNORED_DIRS.contains(&&*name))
}

impl EventsLayout for BidsLayout {
    fn event_files(&self) -> Vec<EventsTarget> {
        self.targets.clone()
    }

    fn resolve(&self, subject: &str, run: u32) -> Result<PathBuf> {
        let matches: Vec<&EventsTarget> = self
            .targets
            .iter()
            .filter(|t| t.key.subject == subject && t.key.run == run)
            .collect();

        match matches.as_slice() {
            [target] => Ok(target.path.clone()),
            [] => Err(EventsError::LayoutError(format!(
                "no events file for sub-{} run-{} under {:?}",
                subject, run, self.root
            ))),
            many => Err(EventsError::LayoutError(format!(
                "{} events files for sub-{} run-{} under {:?}",
                many.len(),
                subject,
                run,
                self.root
            ))),
        }
    }
}
