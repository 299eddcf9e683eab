// src/deploy/mod.rs
//! Rule deployment orchestrator
//!
//! Resolves engine names to configured targets, probes them in parallel,
//! fans the deploy out to every live target, and summarizes success. A
//! deployment counts as successful when strictly more than half of the
//! per-target attempts succeed.

use futures_util::future::join_all;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engines::{
    system_registry, DeploymentResult, DeploymentTarget, DetectionEngineAdapter, EngineType,
};
use crate::types::RuleRecord;

/// How many recent per-target results are kept for the status surface.
const RESULT_HISTORY_CAP: usize = 200;

/// Static view of the configured deployment targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub total_targets: usize,
    pub enabled_targets: usize,
    pub targets: BTreeMap<String, TargetStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    pub engine_type: EngineType,
    pub enabled: bool,
    pub has_endpoint: bool,
    pub rule_format: String,
}

pub struct RuleDeployer {
    targets: HashMap<String, DeploymentTarget>,
    adapters: HashMap<EngineType, Arc<dyn DetectionEngineAdapter>>,
    recent_results: Arc<RwLock<VecDeque<DeploymentResult>>>,
}

impl RuleDeployer {
    pub fn new(targets: Vec<DeploymentTarget>) -> Self {
        Self::with_adapters(targets, system_registry())
    }

    pub fn with_adapters(
        targets: Vec<DeploymentTarget>,
        adapters: HashMap<EngineType, Arc<dyn DetectionEngineAdapter>>,
    ) -> Self {
        let targets: HashMap<String, DeploymentTarget> =
            targets.into_iter().map(|t| (t.name.clone(), t)).collect();
        info!("Rule deployer initialized with {} targets", targets.len());

        Self {
            targets,
            adapters,
            recent_results: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Deploy a rule to the named engines. With `auto_deploy` off every
    /// target runs in validation-only mode (endpoint treated as empty).
    /// Returns true iff strictly more than half of the attempts succeeded.
    pub async fn deploy_rule(
        &self,
        rule: &RuleRecord,
        engines: &[String],
        auto_deploy: bool,
    ) -> bool {
        let mut selected: Vec<DeploymentTarget> = engines
            .iter()
            .filter_map(|name| self.targets.get(name))
            .filter(|t| t.enabled)
            .cloned()
            .collect();

        if selected.is_empty() {
            warn!(
                "No enabled targets found for rule {} among {:?}",
                rule.rule_id, engines
            );
            return false;
        }

        if !auto_deploy {
            for target in &mut selected {
                target.endpoint.clear();
            }
        }

        // Probe every target in parallel and drop the ones that fail.
        let probes = join_all(selected.iter().map(|target| async {
            match self.adapters.get(&target.engine_type) {
                Some(adapter) => adapter.probe(target).await,
                None => {
                    error!("No adapter registered for engine type {}", target.engine_type);
                    false
                }
            }
        }))
        .await;

        let live_targets: Vec<DeploymentTarget> = selected
            .into_iter()
            .zip(probes)
            .filter_map(|(target, alive)| alive.then_some(target))
            .collect();

        if live_targets.is_empty() {
            error!("No targets with live connections for rule {}", rule.rule_id);
            return false;
        }

        let results = join_all(live_targets.iter().map(|target| async {
            match self.adapters.get(&target.engine_type) {
                Some(adapter) => adapter.deploy(rule, target).await,
                None => DeploymentResult::failure(
                    &rule.rule_id,
                    &target.name,
                    format!("no adapter for engine type {}", target.engine_type),
                ),
            }
        }))
        .await;

        let mut successful = 0usize;
        for result in &results {
            if result.success {
                successful += 1;
                info!("Deployed {} to {}", result.rule_id, result.target_name);
            } else {
                error!(
                    "Failed to deploy {} to {}: {}",
                    result.rule_id,
                    result.target_name,
                    result.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let attempted = results.len();
        self.record_results(results).await;

        info!(
            "Rule {} deployment: {}/{} targets successful",
            rule.rule_id, successful, attempted
        );

        (successful as f64) / (attempted as f64) > 0.5
    }

    /// Probe every configured target, deployed or not.
    pub async fn test_all_connections(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();

        for (name, target) in &self.targets {
            let reachable = match self.adapters.get(&target.engine_type) {
                Some(adapter) => adapter.probe(target).await,
                None => {
                    error!("No adapter for {} ({})", name, target.engine_type);
                    false
                }
            };
            info!(
                "{} {} ({})",
                if reachable { "ok" } else { "unreachable" },
                name,
                target.engine_type
            );
            results.insert(name.clone(), reachable);
        }

        results
    }

    /// Static view of the configured targets.
    pub fn deployment_status(&self) -> DeploymentStatus {
        let targets: BTreeMap<String, TargetStatus> = self
            .targets
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    TargetStatus {
                        engine_type: t.engine_type,
                        enabled: t.enabled,
                        has_endpoint: !t.endpoint.is_empty(),
                        rule_format: t.rule_format.clone(),
                    },
                )
            })
            .collect();

        DeploymentStatus {
            total_targets: self.targets.len(),
            enabled_targets: self.targets.values().filter(|t| t.enabled).count(),
            targets,
        }
    }

    /// Most recent per-target deployment results, newest last.
    pub async fn recent_results(&self, limit: usize) -> Vec<DeploymentResult> {
        let ring = self.recent_results.read().await;
        ring.iter()
            .skip(ring.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    async fn record_results(&self, results: Vec<DeploymentResult>) {
        let mut ring = self.recent_results.write().await;
        for result in results {
            ring.push_back(result);
            if ring.len() > RESULT_HISTORY_CAP {
                ring.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RuleValidation, SystemClock};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap as Map;
    use std::sync::Arc;

    /// Test adapter with scripted probe/deploy outcomes per target name.
    struct ScriptedAdapter {
        probe_ok: HashMap<String, bool>,
        deploy_ok: HashMap<String, bool>,
    }

    #[async_trait]
    impl DetectionEngineAdapter for ScriptedAdapter {
        fn engine_type(&self) -> EngineType {
            EngineType::Mock
        }

        fn translate(&self, rule: &RuleRecord) -> Result<String> {
            Ok(format!("scripted::{}", rule.rule_id))
        }

        async fn probe(&self, target: &DeploymentTarget) -> bool {
            *self.probe_ok.get(&target.name).unwrap_or(&true)
        }

        async fn deploy(&self, rule: &RuleRecord, target: &DeploymentTarget) -> DeploymentResult {
            if *self.deploy_ok.get(&target.name).unwrap_or(&true) {
                DeploymentResult {
                    rule_id: rule.rule_id.clone(),
                    target_name: target.name.clone(),
                    success: true,
                    deployed_rule_id: Some(format!("dep_{}", rule.rule_id)),
                    deployment_time: None,
                    error_message: None,
                    converted_rule: None,
                }
            } else {
                DeploymentResult::failure(&rule.rule_id, &target.name, "deploy rejected with status 500")
            }
        }
    }

    fn target(name: &str) -> DeploymentTarget {
        DeploymentTarget {
            name: name.to_string(),
            engine_type: EngineType::Mock,
            endpoint: "http://localhost:9999".to_string(),
            credentials: Map::new(),
            enabled: true,
            rule_format: "mock".to_string(),
        }
    }

    fn rule(id: &str) -> RuleRecord {
        RuleRecord {
            rule_id: id.to_string(),
            title: id.to_string(),
            rule_yaml: String::new(),
            validation: RuleValidation::default(),
            source_incident: None,
            generated_at: None,
            incident_severity: None,
        }
    }

    fn deployer_with(
        targets: Vec<DeploymentTarget>,
        probe_ok: &[(&str, bool)],
        deploy_ok: &[(&str, bool)],
    ) -> RuleDeployer {
        let adapter = ScriptedAdapter {
            probe_ok: probe_ok.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
            deploy_ok: deploy_ok.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        };
        let mut adapters: HashMap<EngineType, Arc<dyn DetectionEngineAdapter>> = HashMap::new();
        adapters.insert(EngineType::Mock, Arc::new(adapter));
        RuleDeployer::with_adapters(targets, adapters)
    }

    #[tokio::test]
    async fn unknown_engines_return_false() {
        let deployer = deployer_with(vec![target("t1")], &[], &[]);
        let ok = deployer
            .deploy_rule(&rule("r"), &["nope".to_string()], true)
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn all_probes_failing_returns_false() {
        let deployer = deployer_with(vec![target("t1"), target("t2")], &[("t1", false), ("t2", false)], &[]);
        let engines = vec!["t1".to_string(), "t2".to_string()];
        assert!(!deployer.deploy_rule(&rule("r"), &engines, true).await);
    }

    #[tokio::test]
    async fn exactly_half_successful_is_a_failure() {
        // T3's probe fails, leaving T1 (deploy 500) and T2 (deploy 201):
        // 1/2 success is not strictly greater than 0.5.
        let deployer = deployer_with(
            vec![target("t1"), target("t2"), target("t3")],
            &[("t3", false)],
            &[("t1", false)],
        );
        let engines = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        assert!(!deployer.deploy_rule(&rule("r5"), &engines, true).await);

        // Both per-target attempts were retained.
        let recent = deployer.recent_results(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.iter().filter(|r| r.success).count(), 1);
    }

    #[tokio::test]
    async fn strict_majority_succeeds() {
        let deployer = deployer_with(
            vec![target("t1"), target("t2"), target("t3")],
            &[],
            &[("t3", false)],
        );
        let engines = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        assert!(deployer.deploy_rule(&rule("r"), &engines, true).await);
    }

    #[tokio::test]
    async fn disabled_targets_are_skipped() {
        let mut disabled = target("t1");
        disabled.enabled = false;
        let deployer = deployer_with(vec![disabled], &[], &[]);
        assert!(!deployer.deploy_rule(&rule("r"), &["t1".to_string()], true).await);
    }

    #[tokio::test]
    async fn auto_deploy_off_strips_endpoints() {
        // The real mock adapter reports a deployed id only when an endpoint
        // is present; with auto_deploy off it must behave as a dry run.
        let mut adapters: HashMap<EngineType, Arc<dyn DetectionEngineAdapter>> = HashMap::new();
        adapters.insert(
            EngineType::Mock,
            Arc::new(crate::engines::MockAdapter::new(Arc::new(SystemClock))),
        );
        let deployer = RuleDeployer::with_adapters(vec![target("t1")], adapters);

        assert!(deployer.deploy_rule(&rule("r"), &["t1".to_string()], false).await);
        let recent = deployer.recent_results(1).await;
        assert!(recent[0].success);
        assert!(recent[0].deployed_rule_id.is_none());
    }

    #[tokio::test]
    async fn connection_test_covers_all_targets() {
        let deployer = deployer_with(vec![target("t1"), target("t2")], &[("t2", false)], &[]);
        let results = deployer.test_all_connections().await;
        assert_eq!(results.get("t1"), Some(&true));
        assert_eq!(results.get("t2"), Some(&false));
    }

    #[tokio::test]
    async fn status_reflects_configuration() {
        let mut t2 = target("t2");
        t2.enabled = false;
        t2.endpoint = String::new();
        let deployer = deployer_with(vec![target("t1"), t2], &[], &[]);

        let status = deployer.deployment_status();
        assert_eq!(status.total_targets, 2);
        assert_eq!(status.enabled_targets, 1);
        assert!(status.targets["t1"].has_endpoint);
        assert!(!status.targets["t2"].has_endpoint);
    }
}
