//! Events table writer
//!
//! Sorts the events of one subject/run and writes them as a tab-separated
//! BIDS events table that fully replaces the previous file.

use crate::config::EventMode;
use crate::types::{EventsError, OutputEvent, Result};
use csv::{Terminator, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sort events by ascending onset
///
/// The sort is stable, so events with equal onsets keep their emission order.
pub fn sort_events(events: &mut [OutputEvent]) {
    events.sort_by(|a, b| a.onset_s.total_cmp(&b.onset_s));
}

/// Format a number the way the events table expects
///
/// Integral values keep one decimal (`12.0`), everything else uses the
/// shortest representation that round-trips.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn event_row(event: &OutputEvent, mode: EventMode) -> Vec<String> {
    match mode {
        EventMode::RatingEvents => vec![
            format_number(event.onset_s),
            format_optional(event.duration_s),
            event.trial_type.clone(),
            event.stim_file.clone(),
        ],
        EventMode::ResponseTime => vec![
            format_number(event.onset_s),
            format_optional(event.duration_s),
            event.trial_type.clone(),
            format_optional(event.response_time),
            event.stim_file.clone(),
        ],
    }
}

/// Serialize events (in the given order) into any writer
pub fn write_table<W: Write>(writer: W, events: &[OutputEvent], mode: EventMode) -> std::io::Result<()> {
    let mut table = WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(writer);

    table.write_record(mode.columns())?;
    for event in events {
        table.write_record(event_row(event, mode))?;
    }
    table.flush()?;
    Ok(())
}

/// Render events into an in-memory table
pub fn render_table(events: &[OutputEvent], mode: EventMode) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_table(&mut buffer, events, mode)?;
    Ok(buffer)
}

/// Hidden sibling used to stage a replacement before it is renamed into place
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Sort and write the events of one subject/run, replacing `path`
///
/// The table is staged in a sibling file and renamed over `path`, so a
/// failed write leaves the previous file untouched. The parent directory
/// must already exist.
pub fn write_events(path: &Path, events: &mut [OutputEvent], mode: EventMode) -> Result<()> {
    sort_events(events);

    if events.is_empty() {
        log::info!("No matching trials, writing header-only table to {:?}", path);
    }

    let write_err = |source: std::io::Error| EventsError::DestinationWriteError {
        path: path.to_path_buf(),
        source,
    };

    // The previous table stays intact until the new one is complete
    let table = render_table(events, mode).map_err(write_err)?;
    let staging = staging_path(path);
    if let Err(e) = fs::write(&staging, &table).and_then(|_| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(write_err(e));
    }

    log::debug!("Wrote {} events to {:?}", events.len(), path);
    Ok(())
}
