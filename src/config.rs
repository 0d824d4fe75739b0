//! Configuration management for rolescope
//!
//! This module provides the analysis configuration structure and loading
//! functionality. Configuration may be written as YAML, JSON, or TOML.
//!
//! # Examples
//!
//! **YAML Format:**
//! ```yaml
//! pattern_min_confidence: 0.8
//! phase_min_confidence: 0.75
//! concern_min_confidence: 0.6
//! include_patterns: true
//! ```
//!
//! **TOML Format:**
//! ```toml
//! pattern_min_confidence = 0.8
//! include_patterns = false
//! ```
//!
//! A custom phase table may sit next to it as `phase_patterns.yml`; see
//! [`crate::phases::PhasePatterns`] for its shape.

use crate::phases::PhasePatterns;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the custom phase table inside the config directory
pub const PHASE_PATTERNS_FILE: &str = "phase_patterns.yml";

/// Threshold used by the pattern analysis convenience entry points
pub const DEFAULT_PATTERN_MIN_CONFIDENCE: f64 = 0.7;
/// Threshold a phase sequence must reach to count as a coherent pipeline
pub const DEFAULT_PHASE_MIN_CONFIDENCE: f64 = 0.8;
/// Threshold for a concern to be reported as a file's primary concern
pub const DEFAULT_CONCERN_MIN_CONFIDENCE: f64 = 0.6;

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum confidence for anti-pattern suggestions to be reported
    pub pattern_min_confidence: f64,
    /// Minimum coherence score for a file to be treated as one pipeline
    pub phase_min_confidence: f64,
    /// Minimum share of tasks for a concern to dominate a file
    pub concern_min_confidence: f64,
    /// Whether the complexity report embeds a pattern analysis
    pub include_patterns: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pattern_min_confidence: DEFAULT_PATTERN_MIN_CONFIDENCE,
            phase_min_confidence: DEFAULT_PHASE_MIN_CONFIDENCE,
            concern_min_confidence: DEFAULT_CONCERN_MIN_CONFIDENCE,
            include_patterns: true,
        }
    }
}

impl AnalysisConfig {
    /// Reject thresholds outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        ensure_confidence("pattern_min_confidence", self.pattern_min_confidence)?;
        ensure_confidence("phase_min_confidence", self.phase_min_confidence)?;
        ensure_confidence("concern_min_confidence", self.concern_min_confidence)?;
        Ok(())
    }
}

/// Fail when a confidence threshold is not a number in `[0, 1]`
pub fn ensure_confidence(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be between 0.0 and 1.0, got {}", field, value);
    }
    Ok(())
}

/// Default configuration directory
///
/// `/etc/rolescope` when it exists, otherwise the user configuration directory.
pub fn default_config_dir() -> PathBuf {
    let system_config = PathBuf::from("/etc/rolescope");
    if system_config.exists() {
        system_config
    } else {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rolescope")
    }
}

/// Load analysis configuration from the config directory
///
/// Looks for `rolescope.yml`, `rolescope.json`, and `rolescope.toml` in that
/// order and falls back to the defaults when none exists.
pub fn load_analysis_config(config_dir: &Path) -> Result<AnalysisConfig> {
    let yaml_path = config_dir.join("rolescope.yml");
    let json_path = config_dir.join("rolescope.json");
    let toml_path = config_dir.join("rolescope.toml");

    let config: AnalysisConfig = if yaml_path.exists() {
        let contents = std::fs::read_to_string(&yaml_path)
            .with_context(|| format!("Failed to read {}", yaml_path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", yaml_path.display()))?
    } else if json_path.exists() {
        let contents = std::fs::read_to_string(&json_path)
            .with_context(|| format!("Failed to read {}", json_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", json_path.display()))?
    } else if toml_path.exists() {
        let contents = std::fs::read_to_string(&toml_path)
            .with_context(|| format!("Failed to read {}", toml_path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", toml_path.display()))?
    } else {
        return Ok(AnalysisConfig::default());
    };

    config.validate()?;
    Ok(config)
}

/// Load the phase table from the config directory
///
/// Falls back to the built-in table when `phase_patterns.yml` is absent.
pub fn load_phase_patterns(config_dir: &Path) -> Result<PhasePatterns> {
    let path = config_dir.join(PHASE_PATTERNS_FILE);
    if !path.exists() {
        return Ok(PhasePatterns::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let patterns = PhasePatterns::from_yaml_str(&contents)
        .with_context(|| format!("Invalid phase patterns in {}", path.display()))?;
    debug!(
        "Loaded {} phase pattern entries from {}",
        patterns.entries().len(),
        path.display()
    );
    Ok(patterns)
}
