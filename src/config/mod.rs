// src/config/mod.rs
//! Configuration surface for the detection loop, the tuning engine and the
//! performance thresholds. Files are YAML; every key has a default so a
//! missing file or a partial file still yields a working configuration.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::engines::{DeploymentTarget, EngineType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("threshold {name} = {value} outside the expected range {range}")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        range: &'static str,
    },
    #[error("target {target} has an invalid endpoint: {source}")]
    InvalidEndpoint {
        target: String,
        #[source]
        source: url::ParseError,
    },
}

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionLoopConfig {
    /// Inter-cycle sleep.
    pub cycle_interval_minutes: u64,
    /// How far back to pull incidents.
    pub lookback_hours: i64,
    /// Reserved; not yet used in deployment gating.
    pub min_confidence_threshold: f64,
    /// Cap on deployment attempts per cycle.
    pub max_rules_per_cycle: usize,
    /// Analysis window for feedback and performance.
    pub performance_window_hours: i64,
    pub tuning_enabled: bool,
    /// When false, adapters run in validation-only mode.
    pub auto_deployment_enabled: bool,
    /// Default deployment fan-out, by target name.
    pub detection_engines: Vec<String>,
}

impl Default for DetectionLoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_minutes: 60,
            lookback_hours: 24,
            min_confidence_threshold: 0.7,
            max_rules_per_cycle: 10,
            performance_window_hours: 168,
            tuning_enabled: true,
            auto_deployment_enabled: false,
            detection_engines: vec![
                "elasticsearch".to_string(),
                "splunk".to_string(),
                "qradar".to_string(),
            ],
        }
    }
}

impl DetectionLoopConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_yaml(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("min_confidence_threshold", self.min_confidence_threshold)?;
        Ok(())
    }
}

/// Tuning engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub auto_apply_low_risk: bool,
    pub require_approval_medium_risk: bool,
    pub require_approval_high_risk: bool,
    pub max_recommendations_per_rule: usize,
    pub min_feedback_samples: usize,
    /// Rules scoring below this are considered for tuning.
    pub tuning_score_threshold: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            auto_apply_low_risk: true,
            require_approval_medium_risk: true,
            require_approval_high_risk: true,
            max_recommendations_per_rule: 3,
            min_feedback_samples: 10,
            tuning_score_threshold: 0.7,
        }
    }
}

impl TuningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("tuning_score_threshold", self.tuning_score_threshold)?;
        Ok(())
    }
}

/// Thresholds the performance monitor alerts against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorThresholds {
    pub min_performance_score: f64,
    pub max_false_positive_rate: f64,
    pub min_true_positive_rate: f64,
    /// Alerts per hour.
    pub max_alert_frequency: f64,
    pub min_reliability_score: f64,
    pub max_volatility: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            min_performance_score: 0.6,
            max_false_positive_rate: 0.2,
            min_true_positive_rate: 0.8,
            max_alert_frequency: 10.0,
            min_reliability_score: 0.7,
            max_volatility: 0.3,
        }
    }
}

impl MonitorThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("min_performance_score", self.min_performance_score)?;
        check_ratio("max_false_positive_rate", self.max_false_positive_rate)?;
        check_ratio("min_true_positive_rate", self.min_true_positive_rate)?;
        check_ratio("min_reliability_score", self.min_reliability_score)?;
        check_ratio("max_volatility", self.max_volatility)?;
        if self.max_alert_frequency <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "max_alert_frequency",
                value: self.max_alert_frequency,
                range: "> 0",
            });
        }
        Ok(())
    }
}

/// Deployment targets file: a list of targets under `deployment_targets`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub deployment_targets: Vec<DeploymentTarget>,
}

impl TargetsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<DeploymentTarget>, ConfigError> {
        let config: Self = load_yaml(path.as_ref())?;
        validate_targets(&config.deployment_targets)?;
        Ok(config.deployment_targets)
    }
}

/// Endpointless defaults so the loop can run its fan-out in validation-only
/// mode without any engine configured.
pub fn default_targets() -> Vec<DeploymentTarget> {
    vec![
        DeploymentTarget {
            name: "elasticsearch".to_string(),
            engine_type: EngineType::Elasticsearch,
            endpoint: String::new(),
            credentials: Default::default(),
            enabled: true,
            rule_format: "elastic".to_string(),
        },
        DeploymentTarget {
            name: "splunk".to_string(),
            engine_type: EngineType::Splunk,
            endpoint: String::new(),
            credentials: Default::default(),
            enabled: true,
            rule_format: "spl".to_string(),
        },
        DeploymentTarget {
            name: "mock".to_string(),
            engine_type: EngineType::Mock,
            endpoint: String::new(),
            credentials: Default::default(),
            enabled: true,
            rule_format: "mock".to_string(),
        },
    ]
}

pub fn validate_targets(targets: &[DeploymentTarget]) -> Result<(), ConfigError> {
    for target in targets {
        if !target.endpoint.is_empty() {
            Url::parse(&target.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
                target: target.name.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

fn check_ratio(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            range: "[0, 1]",
        });
    }
    Ok(())
}
