// src/types/mod.rs - Shared rule document model and core enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Rule severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity string used by the Elasticsearch detection-rule envelope.
    pub fn engine_severity(&self) -> &'static str {
        match self {
            Severity::Informational | Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Risk score used by the Elasticsearch detection-rule envelope.
    pub fn risk_score(&self) -> u8 {
        match self {
            Severity::Informational | Severity::Low => 25,
            Severity::Medium => 47,
            Severity::High => 73,
            Severity::Critical => 99,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "informational",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Validation errors for a rule body.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule body failed to parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rule has no selection entries")]
    EmptySelection,
    #[error("rule has an empty condition")]
    EmptyCondition,
}

/// Detection block of a rule body: selection fields, condition expression
/// and optional aggregation timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub selection: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

/// Parsed rule body. Unknown top-level keys are preserved so that a
/// parse -> mutate -> serialize round trip keeps fields this crate does not
/// interpret (date, logsource extensions, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigmaDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logsource: Option<serde_yaml::Value>,
    pub detection: Detection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub falsepositives: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl SigmaDocument {
    /// Parse a rule body and check the structural requirements: at least one
    /// selection entry and a non-empty condition.
    pub fn parse(rule_yaml: &str) -> Result<Self, RuleError> {
        let doc: SigmaDocument = serde_yaml::from_str(rule_yaml)?;
        if doc.detection.selection.is_empty() {
            return Err(RuleError::EmptySelection);
        }
        if doc.detection.condition.trim().is_empty() {
            return Err(RuleError::EmptyCondition);
        }
        Ok(doc)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn level_or_default(&self) -> Severity {
        self.level.unwrap_or(Severity::Medium)
    }
}

/// Validation outcome carried on a rule record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleValidation {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl RuleValidation {
    pub fn check(rule_yaml: &str) -> Self {
        match SigmaDocument::parse(rule_yaml) {
            Ok(_) => Self { valid: true, errors: Vec::new() },
            Err(e) => Self { valid: false, errors: vec![e.to_string()] },
        }
    }
}

/// Interchange record for a rule. The loop reads these from the incident
/// source, mutates the body through tuning, and writes them back through the
/// rule repository; it never creates one from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule_id: String,
    #[serde(default)]
    pub title: String,
    pub rule_yaml: String,
    #[serde(default)]
    pub validation: RuleValidation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_incident: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_severity: Option<Severity>,
}

impl RuleRecord {
    pub fn parse_body(&self) -> Result<SigmaDocument, RuleError> {
        SigmaDocument::parse(&self.rule_yaml)
    }

    pub fn revalidate(&mut self) {
        self.validation = RuleValidation::check(&self.rule_yaml);
    }
}

/// Clock abstraction so window calculations and tests can agree on "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
