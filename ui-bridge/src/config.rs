//! Engine configuration
//!
//! All knobs have defaults, so an empty YAML/JSON document is a valid config.
//! Files are picked by extension; environment variables override file values.

use crate::errors::BridgeError;
use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Relative weight of each scoring dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreWeights {
    pub text_weight: f64,
    pub accessibility_weight: f64,
    pub role_weight: f64,
    pub spatial_weight: f64,
    pub alias_weight: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            text_weight: 0.4,
            accessibility_weight: 0.15,
            role_weight: 0.15,
            spatial_weight: 0.1,
            alias_weight: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.text_weight
            + self.accessibility_weight
            + self.role_weight
            + self.spatial_weight
            + self.alias_weight
    }

    fn all(&self) -> [(&'static str, f64); 5] {
        [
            ("textWeight", self.text_weight),
            ("accessibilityWeight", self.accessibility_weight),
            ("roleWeight", self.role_weight),
            ("spatialWeight", self.spatial_weight),
            ("aliasWeight", self.alias_weight),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    pub weights: ScoreWeights,
    /// Minimum approximate text/alias sub-score that counts as a match.
    pub fuzzy_threshold: f64,
    /// Confidence `best_match` must reach when the caller gives no threshold.
    pub min_confidence: f64,
    /// Sub-scores under this are treated as noise and dropped.
    pub relevance_floor: f64,
    /// Distance in px at which the spatial score reaches zero.
    pub spatial_radius: f64,
    /// Whether criteria without an explicit `fuzzy` flag match approximately.
    pub fuzzy_by_default: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            fuzzy_threshold: 0.7,
            min_confidence: 0.5,
            relevance_floor: 0.05,
            spatial_radius: 500.0,
            fuzzy_by_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionConfig {
    pub confidence_threshold: f64,
    pub timeout_ms: u64,
    /// How many runner-up candidates to report with a response.
    pub max_alternatives: usize,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            timeout_ms: 5000,
            max_alternatives: 3,
        }
    }
}

impl ActionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssertionConfig {
    pub default_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub include_suggestions: bool,
    pub confidence_threshold: f64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            poll_interval_ms: 100,
            include_suggestions: true,
            confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub search: SearchConfig,
    pub action: ActionConfig,
    pub assertion: AssertionConfig,
}

impl BridgeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: BridgeConfig =
            serde_yaml::from_str(yaml).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BridgeConfig =
            serde_json::from_str(json).context("Failed to parse JSON config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(anyhow!(
                "Unsupported config file extension {:?} for {}",
                other,
                path.display()
            )),
        }
    }

    /// Defaults overlaid with `UI_BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (normally `std::env::var`).
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let float = |key: &str| -> Result<Option<f64>> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .map_err(|_| anyhow!("{key} must be a number, got '{v}'"))
                })
                .transpose()
        };
        let millis = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| parse_duration(&v).with_context(|| format!("Invalid {key}")))
                .transpose()
        };

        if let Some(v) = float("UI_BRIDGE_FUZZY_THRESHOLD")? {
            self.search.fuzzy_threshold = v;
        }
        if let Some(v) = float("UI_BRIDGE_MIN_CONFIDENCE")? {
            self.search.min_confidence = v;
        }
        if let Some(v) = float("UI_BRIDGE_ACTION_THRESHOLD")? {
            self.action.confidence_threshold = v;
        }
        if let Some(v) = millis("UI_BRIDGE_ACTION_TIMEOUT")? {
            self.action.timeout_ms = v;
        }
        if let Some(v) = millis("UI_BRIDGE_ASSERT_TIMEOUT")? {
            self.assertion.default_timeout_ms = v;
        }
        if let Some(v) = millis("UI_BRIDGE_POLL_INTERVAL")? {
            self.assertion.poll_interval_ms = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        for (name, weight) in self.search.weights.all() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(BridgeError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {weight}"
                )));
            }
        }
        let sum = self.search.weights.sum();
        if sum > 1.0 + 1e-9 {
            return Err(BridgeError::InvalidConfig(format!(
                "score weights must sum to at most 1, got {sum:.3}"
            )));
        }
        if sum <= 0.0 {
            return Err(BridgeError::InvalidConfig(
                "at least one score weight must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("search.fuzzyThreshold", self.search.fuzzy_threshold),
            ("search.minConfidence", self.search.min_confidence),
            ("search.relevanceFloor", self.search.relevance_floor),
            ("action.confidenceThreshold", self.action.confidence_threshold),
            ("assertion.confidenceThreshold", self.assertion.confidence_threshold),
        ] {
            check_unit(name, value)?;
        }

        if self.search.spatial_radius <= 0.0 {
            return Err(BridgeError::InvalidConfig(
                "search.spatialRadius must be positive".to_string(),
            ));
        }
        if self.assertion.poll_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "assertion.pollIntervalMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject a threshold outside [0, 1].
fn check_unit(name: &str, value: f64) -> Result<(), BridgeError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(BridgeError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

static GLOBAL: OnceCell<BridgeConfig> = OnceCell::new();

/// Process-wide configuration, read from the environment on first use.
///
/// Only the integration edge (`UiBridge::from_env`) reads this; the engine
/// components always receive their config explicitly.
pub fn global() -> &'static BridgeConfig {
    GLOBAL.get_or_init(|| match BridgeConfig::from_env() {
        Ok(config) => {
            debug!(?config, "Loaded bridge config from environment");
            config
        }
        Err(e) => {
            warn!("Ignoring invalid UI_BRIDGE_* environment: {e:#}");
            BridgeConfig::default()
        }
    })
}

const TIME_UNITS: [(&[&str], f64); 4] = [
    (&["ms", "millis", "millisecond", "milliseconds"], 1.0),
    (&["s", "sec", "secs", "second", "seconds"], 1_000.0),
    (&["m", "min", "mins", "minute", "minutes"], 60_000.0),
    (&["h", "hr", "hrs", "hour", "hours"], 3_600_000.0),
];

/// Milliseconds for a `UI_BRIDGE_*` timeout value such as `500`, `250ms`,
/// `1.5s` or `2m`. A bare number is already milliseconds.
pub fn parse_duration(value: &str) -> Result<u64> {
    let value = value.trim();
    let unit_start = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(unit_start);
    let amount: f64 = amount
        .trim()
        .parse()
        .with_context(|| format!("'{value}' does not start with a number"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(anyhow!("'{value}' is not a usable duration"));
    }

    let unit = unit.trim().to_ascii_lowercase();
    let scale = if unit.is_empty() {
        1.0
    } else {
        TIME_UNITS
            .iter()
            .find(|(names, _)| names.contains(&unit.as_str()))
            .map(|(_, scale)| *scale)
            .ok_or_else(|| anyhow!("'{unit}' is not a time unit (use ms, s, m or h)"))?
    };
    Ok((amount * scale).round() as u64)
}
