// src/engines/mod.rs
//! Detection engine adapters
//!
//! Each adapter knows how to translate a rule body into the engine-native
//! form, probe the engine for liveness, and push a rule. Adapters fail
//! closed: probe and deploy never surface errors to the orchestrator, and
//! there are no retries at this layer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{Clock, RuleRecord, SystemClock};

pub mod elasticsearch;
pub mod mock;
pub mod splunk;

pub use elasticsearch::ElasticsearchAdapter;
pub use mock::MockAdapter;
pub use splunk::SplunkAdapter;

/// Per-probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-deploy timeout.
pub const DEPLOY_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported engine kinds. Deserializing an unknown kind from configuration
/// fails, which surfaces as a fatal startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Elasticsearch,
    Splunk,
    Mock,
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineType::Elasticsearch => "elasticsearch",
            EngineType::Splunk => "splunk",
            EngineType::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// A target detection engine for rule deployment. Static configuration,
/// created at startup. An empty endpoint means validation-only (dry-run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub name: String,
    pub engine_type: EngineType,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_rule_format")]
    pub rule_format: String,
}

fn default_enabled() -> bool {
    true
}

fn default_rule_format() -> String {
    "sigma".to_string()
}

impl DeploymentTarget {
    pub fn is_dry_run(&self) -> bool {
        self.endpoint.is_empty()
    }

    pub fn username(&self) -> &str {
        self.credentials.get("username").map(String::as_str).unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.credentials.get("password").map(String::as_str).unwrap_or("")
    }
}

/// Immutable record of a single (rule, target) deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub rule_id: String,
    pub target_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_rule: Option<String>,
}

impl DeploymentResult {
    pub fn failure(rule_id: &str, target_name: &str, error: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            target_name: target_name.to_string(),
            success: false,
            deployed_rule_id: None,
            deployment_time: None,
            error_message: Some(error.into()),
            converted_rule: None,
        }
    }
}

/// Capability set every engine adapter implements.
#[async_trait]
pub trait DetectionEngineAdapter: Send + Sync {
    /// The engine kind this adapter serves.
    fn engine_type(&self) -> EngineType;

    /// Translate a rule into the engine-native form. Pure: no I/O, no clock.
    fn translate(&self, rule: &RuleRecord) -> Result<String>;

    /// True when the engine is reachable and authentication succeeds, or
    /// when the target has no endpoint (dry-run). Never raises.
    async fn probe(&self, target: &DeploymentTarget) -> bool;

    /// Translate and push the rule. With an empty endpoint the result is a
    /// successful validation-only deployment carrying only the converted
    /// rule. Never raises; failures land in `error_message`.
    async fn deploy(&self, rule: &RuleRecord, target: &DeploymentTarget) -> DeploymentResult;
}

/// Build the default adapter registry keyed by engine type.
pub fn default_registry(
    clock: Arc<dyn Clock>,
) -> HashMap<EngineType, Arc<dyn DetectionEngineAdapter>> {
    let mut adapters: HashMap<EngineType, Arc<dyn DetectionEngineAdapter>> = HashMap::new();
    adapters.insert(
        EngineType::Elasticsearch,
        Arc::new(ElasticsearchAdapter::new(clock.clone())),
    );
    adapters.insert(EngineType::Splunk, Arc::new(SplunkAdapter::new(clock.clone())));
    adapters.insert(EngineType::Mock, Arc::new(MockAdapter::new(clock)));
    adapters
}

/// Registry with the wall clock, for production construction sites.
pub fn system_registry() -> HashMap<EngineType, Arc<dyn DetectionEngineAdapter>> {
    default_registry(Arc::new(SystemClock))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_type_parses_lowercase() {
        let t: EngineType = serde_yaml::from_str("elasticsearch").unwrap();
        assert_eq!(t, EngineType::Elasticsearch);
        assert!(serde_yaml::from_str::<EngineType>("qradar").is_err());
    }

    #[test]
    fn target_defaults() {
        let yaml = "name: es-dev\nengine_type: elasticsearch\n";
        let target: DeploymentTarget = serde_yaml::from_str(yaml).unwrap();
        assert!(target.enabled);
        assert!(target.is_dry_run());
        assert_eq!(target.rule_format, "sigma");
        assert_eq!(target.username(), "");
    }

    #[test]
    fn registry_covers_all_engine_types() {
        let registry = system_registry();
        assert!(registry.contains_key(&EngineType::Elasticsearch));
        assert!(registry.contains_key(&EngineType::Splunk));
        assert!(registry.contains_key(&EngineType::Mock));
    }
}
