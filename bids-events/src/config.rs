//! Transformation configuration types
//!
//! This module defines the options that select between the output variants
//! of the event reconstruction. Filesystem locations are not part of it; the
//! application layer resolves those and hands the library concrete paths.

use crate::rules::RuleSet;
use crate::types::{EventsError, Result};
use serde::{Deserialize, Serialize};

/// Default delay between a trial onset and its rating screen, in seconds
pub const DEFAULT_RATING_OFFSET_SECONDS: f64 = 3.0;

/// How the primary event duration is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Carry the source display duration, converted to seconds
    SourceDuration,
    /// Model every primary event as an impulse
    Zero,
}

/// Which output table layout to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMode {
    /// Emit a synthetic `rating` event after every matched trial
    #[default]
    RatingEvents,
    /// No rating events; add a `response_time` column instead
    ResponseTime,
}

impl EventMode {
    /// Column header of the written events table
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EventMode::RatingEvents => &["onset", "duration", "trial_type", "stim_file"],
            EventMode::ResponseTime => &[
                "onset",
                "duration",
                "trial_type",
                "response_time",
                "stim_file",
            ],
        }
    }
}

/// Unit of the reaction-time column in the source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionTimeUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl ReactionTimeUnit {
    pub fn to_seconds(&self, value: f64) -> f64 {
        match self {
            ReactionTimeUnit::Seconds => value,
            ReactionTimeUnit::Milliseconds => value / 1000.0,
        }
    }
}

/// Configuration for one run of the transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Ordered condition rules (defaults to the Think/No-Think set)
    #[serde(default = "RuleSet::tnt")]
    pub rule_set: RuleSet,

    /// Delay of rating events after the trial onset
    #[serde(default = "default_rating_offset")]
    pub rating_offset_seconds: f64,

    /// Output layout
    #[serde(default)]
    pub mode: EventMode,

    /// Primary event duration policy; no default, every deployment picks one
    pub duration_policy: DurationPolicy,

    /// Unit of the source reaction-time column
    #[serde(default)]
    pub reaction_time_unit: ReactionTimeUnit,

    /// Fail a unit when a trial matches more than one rule
    #[serde(default)]
    pub strict: bool,
}

fn default_rating_offset() -> f64 {
    DEFAULT_RATING_OFFSET_SECONDS
}

impl TransformConfig {
    /// Create a configuration with the given duration policy and defaults
    /// for everything else
    pub fn new(duration_policy: DurationPolicy) -> Self {
        Self {
            rule_set: RuleSet::tnt(),
            rating_offset_seconds: DEFAULT_RATING_OFFSET_SECONDS,
            mode: EventMode::default(),
            duration_policy,
            reaction_time_unit: ReactionTimeUnit::default(),
            strict: false,
        }
    }

    /// Builder method: replace the rule set
    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set = rule_set;
        self
    }

    /// Builder method: set the rating event offset
    pub fn with_rating_offset(mut self, seconds: f64) -> Self {
        self.rating_offset_seconds = seconds;
        self
    }

    /// Builder method: enable or disable rating events
    pub fn with_rating_events(mut self, enabled: bool) -> Self {
        self.mode = if enabled {
            EventMode::RatingEvents
        } else {
            EventMode::ResponseTime
        };
        self
    }

    /// Builder method: set the reaction-time unit
    pub fn with_reaction_time_unit(mut self, unit: ReactionTimeUnit) -> Self {
        self.reaction_time_unit = unit;
        self
    }

    /// Builder method: enable strict matching
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn emit_rating_events(&self) -> bool {
        self.mode == EventMode::RatingEvents
    }

    /// Check the rule set and the rating offset
    ///
    /// A negative offset would place rating events before their trial.
    pub fn validate(&self) -> Result<()> {
        self.rule_set.validate()?;
        if !self.rating_offset_seconds.is_finite() || self.rating_offset_seconds < 0.0 {
            return Err(EventsError::InvalidConfig(format!(
                "rating_offset_seconds must be a non-negative number, got {}",
                self.rating_offset_seconds
            )));
        }
        Ok(())
    }
}
