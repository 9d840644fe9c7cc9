//! Condition rules and the trial classifier
//!
//! A [`ConditionRule`] names an experimental condition and describes which
//! source trials belong to it. Classification is a pure function of one
//! record and the rule set: every rule whose three patterns match is returned,
//! in rule order.

use crate::types::{EventsError, RawTrialRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pattern matched against a string column
///
/// A single value matches by substring containment, a list by exact
/// membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringPattern {
    Contains(String),
    AnyOf(Vec<String>),
}

impl StringPattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            StringPattern::Contains(needle) => value.contains(needle.as_str()),
            StringPattern::AnyOf(values) => values.iter().any(|v| v == value),
        }
    }
}

impl From<&str> for StringPattern {
    fn from(value: &str) -> Self {
        StringPattern::Contains(value.to_string())
    }
}

impl From<&[&str]> for StringPattern {
    fn from(values: &[&str]) -> Self {
        StringPattern::AnyOf(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Pattern matched against the intrusion flag
///
/// An empty flag never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntrusionPattern {
    Equals(u8),
    AnyOf(Vec<u8>),
}

impl IntrusionPattern {
    pub fn matches(&self, value: Option<u8>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            IntrusionPattern::Equals(expected) => *expected == value,
            IntrusionPattern::AnyOf(values) => values.contains(&value),
        }
    }
}

impl From<u8> for IntrusionPattern {
    fn from(value: u8) -> Self {
        IntrusionPattern::Equals(value)
    }
}

impl From<&[u8]> for IntrusionPattern {
    fn from(values: &[u8]) -> Self {
        IntrusionPattern::AnyOf(values.to_vec())
    }
}

/// A named condition matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Output condition label, unique within a rule set
    pub name: String,
    pub condition_img: StringPattern,
    pub trial_type: StringPattern,
    pub intrusion: IntrusionPattern,
}

impl ConditionRule {
    /// Create a new rule
    pub fn new(
        name: impl Into<String>,
        condition_img: impl Into<StringPattern>,
        trial_type: impl Into<StringPattern>,
        intrusion: impl Into<IntrusionPattern>,
    ) -> Self {
        Self {
            name: name.into(),
            condition_img: condition_img.into(),
            trial_type: trial_type.into(),
            intrusion: intrusion.into(),
        }
    }

    /// Check whether all three patterns match the record
    pub fn matches(&self, record: &RawTrialRecord) -> bool {
        self.condition_img.matches(&record.condition_img)
            && self.trial_type.matches(&record.trial_type)
            && self.intrusion.matches(record.intrusion)
    }
}

/// Ordered list of condition rules
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<ConditionRule>,
}

impl RuleSet {
    /// Create a rule set, rejecting empty sets and duplicate names
    pub fn new(rules: Vec<ConditionRule>) -> Result<Self> {
        let set = Self { rules };
        set.validate()?;
        Ok(set)
    }

    /// Think/No-Think paradigm conditions, including filler trials
    pub fn tnt() -> Self {
        let filler_types: &[&str] = &["sF", "rF"];
        let filler_intrusions: &[u8] = &[1, 0];
        Self {
            rules: vec![
                ConditionRule::new("negT", "ENEG", "r", 1),
                ConditionRule::new("negNTi", "ENEG", "s", 1),
                ConditionRule::new("negNTni", "ENEG", "s", 0),
                ConditionRule::new("neutrT", "ENEU", "r", 1),
                ConditionRule::new("neutrNTi", "ENEU", "s", 1),
                ConditionRule::new("neutrNTni", "ENEU", "s", 0),
                ConditionRule::new("filler", "FN", filler_types, filler_intrusions),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(EventsError::InvalidRuleSet("rule set is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.name.is_empty() {
                return Err(EventsError::InvalidRuleSet(
                    "rule with empty name".to_string(),
                ));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(EventsError::InvalidRuleSet(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[ConditionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return every rule matching the record, in rule order
    ///
    /// Zero matches is not an error; the trial is simply left out of the
    /// output. Overlapping matches are all returned.
    pub fn classify<'a>(&'a self, record: &RawTrialRecord) -> Vec<&'a ConditionRule> {
        self.rules.iter().filter(|rule| rule.matches(record)).collect()
    }

    /// Like [`RuleSet::classify`] but fails when more than one rule matches
    pub fn classify_strict<'a>(&'a self, record: &RawTrialRecord) -> Result<Vec<&'a ConditionRule>> {
        let matched = self.classify(record);
        if matched.len() > 1 {
            return Err(EventsError::AmbiguousMatch {
                trial: record.trial,
                rules: matched.iter().map(|r| r.name.clone()).collect(),
            });
        }
        Ok(matched)
    }
}
