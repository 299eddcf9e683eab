// src/engines/splunk.rs
//! Adapter for Splunk targets. Rules become scheduled saved searches.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::Arc;

use crate::types::{Clock, RuleRecord, SigmaDocument};

use super::{
    DeploymentResult, DeploymentTarget, DetectionEngineAdapter, EngineType, DEPLOY_TIMEOUT,
    PROBE_TIMEOUT,
};

const DEFAULT_LOOKBACK: &str = "1h";

pub struct SplunkAdapter {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl SplunkAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            client: reqwest::Client::new(),
            clock,
        }
    }

    /// Render the selection block into an SPL search and enrich the event
    /// stream with the rule identity.
    fn build_spl(doc: &SigmaDocument, rule: &RuleRecord) -> String {
        let mut search_terms = Vec::new();

        for (field, value) in &doc.detection.selection {
            match value {
                serde_yaml::Value::Sequence(items) => {
                    let or_terms: Vec<String> = items
                        .iter()
                        .map(|v| format!("{}=\"{}\"", field, yaml_scalar_to_spl(v)))
                        .collect();
                    search_terms.push(format!("({})", or_terms.join(" OR ")));
                }
                other => {
                    search_terms.push(format!("{}=\"{}\"", field, yaml_scalar_to_spl(other)));
                }
            }
        }

        let base_search = if search_terms.is_empty() {
            "*".to_string()
        } else {
            search_terms.join(" AND ")
        };

        let timeframe = doc
            .detection
            .timeframe
            .clone()
            .unwrap_or_else(|| DEFAULT_LOOKBACK.to_string());

        let rule_id = doc.id.clone().unwrap_or_else(|| rule.rule_id.clone());
        let severity = doc.level_or_default();

        format!(
            "search earliest=-{} {}\n\
             | eval rule_id=\"{}\"\n\
             | eval rule_title=\"{}\"\n\
             | eval severity=\"{}\"\n\
             | table _time, rule_id, rule_title, severity, *",
            timeframe, base_search, rule_id, doc.title, severity.as_str()
        )
    }
}

fn yaml_scalar_to_spl(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

#[async_trait]
impl DetectionEngineAdapter for SplunkAdapter {
    fn engine_type(&self) -> EngineType {
        EngineType::Splunk
    }

    fn translate(&self, rule: &RuleRecord) -> Result<String> {
        let doc = rule
            .parse_body()
            .with_context(|| format!("rule {} has an unparseable body", rule.rule_id))?;
        Ok(Self::build_spl(&doc, rule))
    }

    async fn probe(&self, target: &DeploymentTarget) -> bool {
        if target.is_dry_run() {
            return true;
        }

        let url = format!("{}/services/server/info", target.endpoint);
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
                error!("Splunk probe failed for {}: {}", target.name, e);
                false
            }
        }
    }

    async fn deploy(&self, rule: &RuleRecord, target: &DeploymentTarget) -> DeploymentResult {
        let doc = match rule.parse_body() {
            Ok(doc) => doc,
            Err(e) => return DeploymentResult::failure(&rule.rule_id, &target.name, e.to_string()),
        };
        let spl_query = Self::build_spl(&doc, rule);

        if target.is_dry_run() {
            debug!(
                "Validated SPL conversion for {} (no endpoint configured on {})",
                rule.rule_id, target.name
            );
            return DeploymentResult {
                rule_id: rule.rule_id.clone(),
                target_name: target.name.clone(),
                success: true,
                deployed_rule_id: None,
                deployment_time: Some(self.clock.now()),
                error_message: None,
                converted_rule: Some(spl_query),
            };
        }

        let saved_search_name = format!(
            "cybersentinel_{}",
            doc.id.clone().unwrap_or_else(|| rule.rule_id.clone())
        );
        let form = [
            ("name", saved_search_name.as_str()),
            ("search", spl_query.as_str()),
            ("description", doc.description.as_deref().unwrap_or("")),
            ("dispatch.earliest_time", "-1h"),
            ("dispatch.latest_time", "now"),
            ("cron_schedule", "*/15 * * * *"),
            ("is_scheduled", "1"),
            ("actions", "email"),
            ("alert.track", "1"),
        ];

        let url = format!("{}/services/saved/searches", target.endpoint);
        let response = self
            .client
            .post(&url)
            .form(&form)
            .basic_auth(target.username(), Some(target.password()))
            .timeout(DEPLOY_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if matches!(resp.status().as_u16(), 200 | 201) => {
                info!("Deployed Splunk saved search {}", saved_search_name);
                DeploymentResult {
                    rule_id: rule.rule_id.clone(),
                    target_name: target.name.clone(),
                    success: true,
                    deployed_rule_id: doc.id.clone().or_else(|| Some(rule.rule_id.clone())),
                    deployment_time: Some(self.clock.now()),
                    error_message: None,
                    converted_rule: Some(spl_query),
                }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                error!(
                    "Splunk deployment of {} to {} failed: {} {}",
                    rule.rule_id, target.name, status, body
                );
                DeploymentResult {
                    converted_rule: Some(spl_query),
                    ..DeploymentResult::failure(
                        &rule.rule_id,
                        &target.name,
                        format!("deployment rejected with status {}", status),
                    )
                }
            }
            Err(e) => {
                error!(
                    "Splunk deployment of {} to {} failed: {}",
                    rule.rule_id, target.name, e
                );
                DeploymentResult {
                    converted_rule: Some(spl_query),
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
title: Lateral Movement via SMB
id: rule-spl-1
detection:
    selection:
        dest.port:
            - "445"
            - "139"
        user.name: "svc-*"
    condition: selection
    timeframe: 30m
level: critical
"#;
        RuleRecord {
            rule_id: "rule-spl-1".to_string(),
            title: "Lateral Movement via SMB".to_string(),
            rule_yaml: rule_yaml.to_string(),
            validation: RuleValidation::check(rule_yaml),
            source_incident: None,
            generated_at: None,
            incident_severity: None,
        }
    }

    #[test]
    fn spl_joins_clauses_with_and() {
        let adapter = SplunkAdapter::new(Arc::new(SystemClock));
        let spl = adapter.translate(&sample_rule()).unwrap();

        assert!(spl.starts_with("search earliest=-30m "));
        assert!(spl.contains("(dest.port=\"445\" OR dest.port=\"139\")"));
        assert!(spl.contains(" AND user.name=\"svc-*\""));
        assert!(spl.contains("| eval rule_id=\"rule-spl-1\""));
        assert!(spl.contains("| eval rule_title=\"Lateral Movement via SMB\""));
        assert!(spl.contains("| eval severity=\"critical\""));
        assert!(spl.contains("| table _time, rule_id, rule_title, severity, *"));
    }

    #[test]
    fn spl_defaults_lookback_to_one_hour() {
        let rule_yaml = "title: t\ndetection:\n    selection:\n        a: b\n    condition: selection\n";
        let rule = RuleRecord {
            rule_id: "r".to_string(),
            title: "t".to_string(),
            rule_yaml: rule_yaml.to_string(),
            validation: RuleValidation::check(rule_yaml),
            source_incident: None,
            generated_at: None,
            incident_severity: None,
        };

        let adapter = SplunkAdapter::new(Arc::new(SystemClock));
        let spl = adapter.translate(&rule).unwrap();
        assert!(spl.starts_with("search earliest=-1h a=\"b\""));
    }

    #[tokio::test]
    async fn dry_run_deploy_succeeds_without_deployed_id() {
        let adapter = SplunkAdapter::new(Arc::new(SystemClock));
        let target = DeploymentTarget {
            name: "splunk-dev".to_string(),
            engine_type: EngineType::Splunk,
            endpoint: String::new(),
            credentials: BTreeMap::new(),
            enabled: true,
            rule_format: "spl".to_string(),
        };

        assert!(adapter.probe(&target).await);
        let result = adapter.deploy(&sample_rule(), &target).await;
        assert!(result.success);
        assert!(result.deployed_rule_id.is_none());
        assert!(result.converted_rule.unwrap().contains("earliest=-30m"));
    }
}
