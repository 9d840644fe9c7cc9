//! Event expansion
//!
//! Turns a matched (trial, rule) pair into output events: always one primary
//! event, plus a rating event when the configuration asks for one.

use crate::config::{DurationPolicy, EventMode, TransformConfig};
use crate::rules::ConditionRule;
use crate::types::{OutputEvent, RawTrialRecord, RATING_TRIAL_TYPE};

fn ms_to_seconds(ms: f64) -> f64 {
    ms / 1000.0
}

/// Expand one matched trial into its output events
///
/// The primary event always comes first in the returned vector.
pub fn expand(
    record: &RawTrialRecord,
    rule: &ConditionRule,
    config: &TransformConfig,
) -> Vec<OutputEvent> {
    let onset_s = ms_to_seconds(record.onset_ms);
    let duration_s = match config.duration_policy {
        DurationPolicy::SourceDuration => ms_to_seconds(record.duration_ms),
        DurationPolicy::Zero => 0.0,
    };
    let reaction_time = record
        .reaction_time
        .map(|rt| config.reaction_time_unit.to_seconds(rt));

    match config.mode {
        EventMode::RatingEvents => vec![
            OutputEvent {
                onset_s,
                duration_s: Some(duration_s),
                trial_type: rule.name.clone(),
                response_time: None,
                stim_file: record.condition_img.clone(),
            },
            OutputEvent {
                onset_s: onset_s + config.rating_offset_seconds,
                duration_s: reaction_time,
                trial_type: RATING_TRIAL_TYPE.to_string(),
                response_time: None,
                stim_file: record.condition_img.clone(),
            },
        ],
        EventMode::ResponseTime => vec![OutputEvent {
            onset_s,
            duration_s: Some(duration_s),
            trial_type: rule.name.clone(),
            response_time: reaction_time,
            stim_file: record.condition_img.clone(),
        }],
    }
}
