//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use bids_events::{
    ConditionRule, DurationPolicy, EventMode, ReactionTimeUnit, RuleSet, SourceOptions,
    TransformConfig,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    pub transform: TransformSection,
    /// Condition rules; the Think/No-Think set when omitted
    #[serde(default)]
    pub rules: Vec<ConditionRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Root of the BIDS dataset whose events files are replaced
    pub bids_dir: PathBuf,
    /// Directory holding one source table per subject
    pub source_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub source_extension: String,
}

fn default_extension() -> String {
    "tsv".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub has_header: bool,
}

fn default_delimiter() -> char {
    '\t'
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformSection {
    /// Required: each deployment states how primary durations are derived
    pub duration_policy: DurationPolicy,
    #[serde(default)]
    pub mode: EventMode,
    #[serde(default = "default_rating_offset")]
    pub rating_offset_seconds: f64,
    #[serde(default)]
    pub reaction_time_unit: ReactionTimeUnit,
    #[serde(default)]
    pub strict: bool,
}

fn default_rating_offset() -> f64 {
    bids_events::config::DEFAULT_RATING_OFFSET_SECONDS
}

impl AppConfig {
    /// Build the library transformation config
    pub fn transform_config(&self) -> Result<TransformConfig> {
        let rule_set = if self.rules.is_empty() {
            RuleSet::tnt()
        } else {
            RuleSet::new(self.rules.clone()).context("Invalid [[rules]] section")?
        };

        let section = &self.transform;
        let mut config = TransformConfig::new(section.duration_policy)
            .with_rule_set(rule_set)
            .with_rating_offset(section.rating_offset_seconds)
            .with_reaction_time_unit(section.reaction_time_unit)
            .with_strict(section.strict);
        config.mode = section.mode;
        config.validate().context("Invalid [transform] section")?;
        Ok(config)
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions::new()
            .with_extension(self.paths.source_extension.clone())
            .with_delimiter(self.source.delimiter)
            .with_header(self.source.has_header)
    }

    fn validate(&self) -> Result<()> {
        if !self.source.delimiter.is_ascii() {
            bail!("source delimiter must be a single ASCII character");
        }
        if !self.paths.source_dir.is_dir() {
            bail!("source_dir {:?} is not a directory", self.paths.source_dir);
        }
        if !self.paths.bids_dir.is_dir() {
            bail!("bids_dir {:?} is not a directory", self.paths.bids_dir);
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    // Catch rule errors before any directory is touched
    config.transform_config()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [paths]
            bids_dir = "/data/bids"
            source_dir = "/data/onsets"

            [transform]
            duration_policy = "zero"
            mode = "response_time"
        "#;

        let config = parse_config(toml_content).unwrap();
        assert_eq!(config.paths.source_extension, "tsv");
        assert_eq!(config.source.delimiter, '\t');

        let transform = config.transform_config().unwrap();
        assert_eq!(transform.duration_policy, DurationPolicy::Zero);
        assert!(!transform.emit_rating_events());
        assert_eq!(transform.rating_offset_seconds, 3.0);
        assert_eq!(transform.rule_set, RuleSet::tnt());
    }

    #[test]
    fn test_custom_rules() {
        let toml_content = r#"
            [paths]
            bids_dir = "/data/bids"
            source_dir = "/data/onsets"
            source_extension = "csv"

            [source]
            delimiter = ","
            has_header = true

            [transform]
            duration_policy = "source_duration"
            strict = true

            [[rules]]
            name = "negT"
            condition_img = "ENEG"
            trial_type = "r"
            intrusion = 1

            [[rules]]
            name = "filler"
            condition_img = "FN"
            trial_type = ["sF", "rF"]
            intrusion = [1, 0]
        "#;

        let config = parse_config(toml_content).unwrap();
        let transform = config.transform_config().unwrap();
        assert_eq!(transform.rule_set.len(), 2);
        assert!(transform.strict);

        let options = config.source_options();
        assert_eq!(options.delimiter, ',');
        assert!(options.has_header);
        assert_eq!(options.extension, "csv");
    }

    #[test]
    fn test_duration_policy_is_required() {
        let toml_content = r#"
            [paths]
            bids_dir = "/data/bids"
            source_dir = "/data/onsets"

            [transform]
            mode = "rating_events"
        "#;
        assert!(parse_config(toml_content).is_err());
    }

    #[test]
    fn test_duplicate_rule_names_rejected() {
        let toml_content = r#"
            [paths]
            bids_dir = "/data/bids"
            source_dir = "/data/onsets"

            [transform]
            duration_policy = "zero"

            [[rules]]
            name = "negT"
            condition_img = "ENEG"
            trial_type = "r"
            intrusion = 1

            [[rules]]
            name = "negT"
            condition_img = "ENEU"
            trial_type = "r"
            intrusion = 1
        "#;
        assert!(parse_config(toml_content).is_err());
    }

    #[test]
    fn test_negative_rating_offset_rejected() {
        let toml_content = r#"
            [paths]
            bids_dir = "/data/bids"
            source_dir = "/data/onsets"

            [transform]
            duration_policy = "zero"
            rating_offset_seconds = -1.0
        "#;
        let err = parse_config(toml_content).unwrap_err();
        assert!(format!("{:#}", err).contains("rating_offset_seconds"));
    }

    #[test]
    fn test_load_config_checks_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [paths]
            bids_dir = "/nonexistent/bids"
            source_dir = "/nonexistent/onsets"

            [transform]
            duration_policy = "zero"
            "#,
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }
}
