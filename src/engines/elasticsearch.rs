// src/engines/elasticsearch.rs
//! Adapter for Elasticsearch Security (Kibana detection engine) targets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::types::{Clock, RuleRecord, SigmaDocument};

use super::{
    DeploymentResult, DeploymentTarget, DetectionEngineAdapter, EngineType, DEPLOY_TIMEOUT,
    PROBE_TIMEOUT,
};

pub struct ElasticsearchAdapter {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl ElasticsearchAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            client: reqwest::Client::new(),
            clock,
        }
    }

    /// Build the kuery bool query from the selection block. Lists become
    /// terms matches, strings containing `*` become wildcard matches, other
    /// values become exact term matches.
    fn build_query(doc: &SigmaDocument) -> Value {
        let mut must_clauses = Vec::new();

        for (field, value) in &doc.detection.selection {
            let clause = match value {
                serde_yaml::Value::Sequence(items) => {
                    let terms: Vec<Value> = items.iter().map(yaml_scalar_to_json).collect();
                    json!({ "terms": { field: terms } })
                }
                serde_yaml::Value::String(s) if s.contains('*') => {
                    json!({ "wildcard": { field: s } })
                }
                other => {
                    json!({ "term": { field: yaml_scalar_to_json(other) } })
                }
            };
            must_clauses.push(clause);
        }

        if must_clauses.len() == 1 {
            must_clauses.into_iter().next().unwrap()
        } else {
            json!({ "bool": { "must": must_clauses } })
        }
    }

    fn build_rule_envelope(doc: &SigmaDocument, rule: &RuleRecord) -> Value {
        let severity = doc.level_or_default();

        let mut tags = doc.tags.clone();
        tags.push("sigma".to_string());
        tags.push("cybersentinel".to_string());

        let rule_id = doc.id.clone().unwrap_or_else(|| rule.rule_id.clone());

        let mut envelope = json!({
            "rule_id": rule_id,
            "name": doc.title.clone(),
            "description": doc.description.clone().unwrap_or_default(),
            "severity": severity.engine_severity(),
            "risk_score": severity.risk_score(),
            "query": Self::build_query(doc),
            "language": "kuery",
            "type": "query",
            "enabled": true,
            "interval": "5m",
            "tags": tags,
            "references": doc.references.clone(),
            "false_positives": doc.falsepositives.clone(),
            "author": [doc.author.clone().unwrap_or_else(|| "cybersentinel".to_string())],
        });

        if rule.source_incident.is_some() || rule.generated_at.is_some() {
            envelope["meta"] = json!({
                "source_incident": rule.source_incident,
                "generated_at": rule.generated_at,
                "sigma_rule_id": rule.rule_id,
            });
        }

        envelope
    }
}

fn yaml_scalar_to_json(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        serde_yaml::Value::Number(n) => {
            serde_json::to_value(n.as_f64()).unwrap_or(Value::Null)
        }
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        other => Value::String(format!("{:?}", other)),
    }
}

#[async_trait]
impl DetectionEngineAdapter for ElasticsearchAdapter {
    fn engine_type(&self) -> EngineType {
        EngineType::Elasticsearch
    }

    fn translate(&self, rule: &RuleRecord) -> Result<String> {
        let doc = rule
            .parse_body()
            .with_context(|| format!("rule {} has an unparseable body", rule.rule_id))?;
        let envelope = Self::build_rule_envelope(&doc, rule);
        Ok(serde_json::to_string_pretty(&envelope)?)
    }

    async fn probe(&self, target: &DeploymentTarget) -> bool {
        if target.is_dry_run() {
            return true;
        }

        let url = format!("{}/_cluster/health", target.endpoint);
        let response = self
            .client
            .get(&url)
            .basic_auth(target.username(), Some(target.password()))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) => resp.status().as_u16() == 200,
            Err(e) => {
                error!("Elasticsearch probe failed for {}: {}", target.name, e);
                false
            }
        }
    }

    async fn deploy(&self, rule: &RuleRecord, target: &DeploymentTarget) -> DeploymentResult {
        let converted = match self.translate(rule) {
            Ok(converted) => converted,
            Err(e) => return DeploymentResult::failure(&rule.rule_id, &target.name, e.to_string()),
        };

        if target.is_dry_run() {
            debug!(
                "Validated rule conversion for {} (no endpoint configured on {})",
                rule.rule_id, target.name
            );
            return DeploymentResult {
                rule_id: rule.rule_id.clone(),
                target_name: target.name.clone(),
                success: true,
                deployed_rule_id: None,
                deployment_time: Some(self.clock.now()),
                error_message: None,
                converted_rule: Some(converted),
            };
        }

        let envelope: Value = match serde_json::from_str(&converted) {
            Ok(v) => v,
            Err(e) => return DeploymentResult::failure(&rule.rule_id, &target.name, e.to_string()),
        };
        let deployed_rule_id = envelope["rule_id"].as_str().map(String::from);

        let url = format!("{}/api/detection_engine/rules", target.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&envelope)
            .basic_auth(target.username(), Some(target.password()))
            .header("kbn-xsrf", "true")
            .timeout(DEPLOY_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if matches!(resp.status().as_u16(), 200 | 201) => {
                info!("Deployed rule {} to {}", rule.rule_id, target.name);
                DeploymentResult {
                    rule_id: rule.rule_id.clone(),
                    target_name: target.name.clone(),
                    success: true,
                    deployed_rule_id,
                    deployment_time: Some(self.clock.now()),
                    error_message: None,
                    converted_rule: Some(converted),
                }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                error!(
                    "Elasticsearch deployment of {} to {} failed: {} {}",
                    rule.rule_id, target.name, status, body
                );
                DeploymentResult {
                    converted_rule: Some(converted),
                    ..DeploymentResult::failure(
                        &rule.rule_id,
                        &target.name,
                        format!("deployment rejected with status {}", status),
                    )
                }
            }
            Err(e) => {
                error!(
                    "Elasticsearch deployment of {} to {} failed: {}",
                    rule.rule_id, target.name, e
                );
                DeploymentResult {
                    converted_rule: Some(converted),
                    ..DeploymentResult::failure(&rule.rule_id, &target.name, e.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RuleValidation, SystemClock};
    use std::collections::BTreeMap;

    fn sample_rule() -> RuleRecord {
        let rule_yaml = r#"
title: Suspicious PowerShell Download
id: rule-es-1
description: Detects download cradles
detection:
    selection:
        process.name:
            - "powershell.exe"
            - "pwsh.exe"
        process.command_line: "*DownloadString*"
        event.category: "process"
    condition: selection
level: high
tags:
    - attack.execution
"#;
        RuleRecord {
            rule_id: "rule-es-1".to_string(),
            title: "Suspicious PowerShell Download".to_string(),
            rule_yaml: rule_yaml.to_string(),
            validation: RuleValidation::check(rule_yaml),
            source_incident: Some("inc-7".to_string()),
            generated_at: None,
            incident_severity: None,
        }
    }

    fn dry_run_target() -> DeploymentTarget {
        DeploymentTarget {
            name: "es-dev".to_string(),
            engine_type: EngineType::Elasticsearch,
            endpoint: String::new(),
            credentials: BTreeMap::new(),
            enabled: true,
            rule_format: "elastic".to_string(),
        }
    }

    #[test]
    fn translate_builds_expected_envelope() {
        let adapter = ElasticsearchAdapter::new(Arc::new(SystemClock));
        let converted = adapter.translate(&sample_rule()).unwrap();
        let envelope: Value = serde_json::from_str(&converted).unwrap();

        assert_eq!(envelope["rule_id"], "rule-es-1");
        assert_eq!(envelope["severity"], "high");
        assert_eq!(envelope["risk_score"], 73);
        assert_eq!(envelope["language"], "kuery");
        assert_eq!(envelope["type"], "query");
        assert_eq!(envelope["interval"], "5m");
        assert_eq!(envelope["enabled"], true);

        let tags: Vec<&str> = envelope["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap())
            .collect();
        assert!(tags.contains(&"sigma"));
        assert!(tags.contains(&"cybersentinel"));
        assert!(tags.contains(&"attack.execution"));

        let must = envelope["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 3);
        assert!(must.iter().any(|c| c.get("terms").is_some()));
        assert!(must.iter().any(|c| c.get("wildcard").is_some()));
        assert!(must.iter().any(|c| c.get("term").is_some()));

        assert_eq!(envelope["meta"]["source_incident"], "inc-7");
    }

    #[test]
    fn translate_is_idempotent_on_single_clause() {
        let rule_yaml = "title: t\ndetection:\n    selection:\n        user.name: root\n    condition: selection\nlevel: low\n";
        let rule = RuleRecord {
            rule_id: "r".to_string(),
            title: "t".to_string(),
            rule_yaml: rule_yaml.to_string(),
            validation: RuleValidation::check(rule_yaml),
            source_incident: None,
            generated_at: None,
            incident_severity: None,
        };

        let adapter = ElasticsearchAdapter::new(Arc::new(SystemClock));
        let first = adapter.translate(&rule).unwrap();
        let second = adapter.translate(&rule).unwrap();
        assert_eq!(first, second);

        // A single selection entry collapses to a bare clause.
        let envelope: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(envelope["query"]["term"]["user.name"], "root");
    }

    #[tokio::test]
    async fn empty_endpoint_probe_and_deploy_succeed() {
        let adapter = ElasticsearchAdapter::new(Arc::new(SystemClock));
        let target = dry_run_target();

        assert!(adapter.probe(&target).await);

        let result = adapter.deploy(&sample_rule(), &target).await;
        assert!(result.success);
        assert!(result.deployed_rule_id.is_none());
        assert!(result.converted_rule.is_some());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_closed() {
        let adapter = ElasticsearchAdapter::new(Arc::new(SystemClock));
        let target = DeploymentTarget {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..dry_run_target()
        };

        assert!(!adapter.probe(&target).await);

        let result = adapter.deploy(&sample_rule(), &target).await;
        assert!(!result.success);
        assert!(result.error_message.is_some());
    }
}
