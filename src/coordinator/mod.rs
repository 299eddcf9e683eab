// src/coordinator/mod.rs
//! Detection loop coordinator
//!
//! Runs the end-to-end cycle on a cadence: collect fresh incidents and
//! candidate rules, deploy the qualifying ones, pull feedback on the
//! deployed set, score performance, tune, and record the outcome. Steps are
//! failure-isolated: a collaborator outage degrades to an empty result and
//! an entry in the cycle's error list, never a dead loop.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::config::DetectionLoopConfig;
use crate::deploy::RuleDeployer;
use crate::feedback::FeedbackStore;
use crate::monitor::PerformanceMonitor;
use crate::sources::{Incident, IncidentSource, KnowledgeGraphSink, NullKnowledgeGraph};
use crate::tuning::ContinuousTuningEngine;
use crate::types::{Clock, RuleRecord, Severity};

/// Bounded ring of completed cycles.
const CYCLE_HISTORY_CAP: usize = 100;
/// Cycles considered for the recent-performance aggregate.
const RECENT_CYCLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
}

/// One end-to-end iteration of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionCycle {
    pub cycle_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: CycleStatus,
    pub incidents_processed: usize,
    pub rules_deployed: usize,
    pub rules_tuned: usize,
    pub feedback_collected: usize,
    pub performance_scores: HashMap<String, f64>,
    pub errors: Vec<String>,
}

impl DetectionCycle {
    fn new(cycle_id: String, start_time: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            start_time,
            end_time: None,
            status: CycleStatus::Running,
            incidents_processed: 0,
            rules_deployed: 0,
            rules_tuned: 0,
            feedback_collected: 0,
            performance_scores: HashMap::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentPerformance {
    pub avg_incidents_per_cycle: f64,
    pub avg_rules_deployed_per_cycle: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_cycle: Option<DetectionCycle>,
    pub total_cycles: usize,
    pub deployed_rules_count: usize,
    pub config: DetectionLoopConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_performance: Option<RecentPerformance>,
}

pub struct DetectionLoopCoordinator {
    config: DetectionLoopConfig,
    clock: Arc<dyn Clock>,
    incident_source: Option<Arc<dyn IncidentSource>>,
    knowledge_graph: Arc<dyn KnowledgeGraphSink>,
    deployer: Arc<RuleDeployer>,
    feedback: Arc<FeedbackStore>,
    monitor: Arc<PerformanceMonitor>,
    tuning: Arc<ContinuousTuningEngine>,
    running: Arc<RwLock<bool>>,
    stop_signal: Arc<Notify>,
    current_cycle: Arc<RwLock<Option<DetectionCycle>>>,
    cycle_history: Arc<RwLock<VecDeque<DetectionCycle>>>,
    deployed_rules: Arc<RwLock<HashSet<String>>>,
}

impl DetectionLoopCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DetectionLoopConfig,
        clock: Arc<dyn Clock>,
        incident_source: Option<Arc<dyn IncidentSource>>,
        knowledge_graph: Option<Arc<dyn KnowledgeGraphSink>>,
        deployer: Arc<RuleDeployer>,
        feedback: Arc<FeedbackStore>,
        monitor: Arc<PerformanceMonitor>,
        tuning: Arc<ContinuousTuningEngine>,
    ) -> Self {
        info!(
            "Detection loop coordinator initialized with {}min cycles",
            config.cycle_interval_minutes
        );
        Self {
            config,
            clock,
            incident_source,
            knowledge_graph: knowledge_graph.unwrap_or_else(|| Arc::new(NullKnowledgeGraph)),
            deployer,
            feedback,
            monitor,
            tuning,
            running: Arc::new(RwLock::new(false)),
            stop_signal: Arc::new(Notify::new()),
            current_cycle: Arc::new(RwLock::new(None)),
            cycle_history: Arc::new(RwLock::new(VecDeque::new())),
            deployed_rules: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Start the cycle scheduler. Idempotent.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Detection loop already running");
                return;
            }
            *running = true;
        }

        info!("Starting continuous detection loop");
        let this = self;

        tokio::spawn(async move {
            loop {
                if !*this.running.read().await {
                    break;
                }

                let cycle_id = format!("cycle_{}", this.clock.now().format("%Y%m%d_%H%M%S"));
                if let Err(e) = this.run_cycle(cycle_id).await {
                    error!("Detection cycle failed to start: {}", e);
                }

                if !*this.running.read().await {
                    break;
                }

                info!(
                    "Waiting {} minutes for next cycle",
                    this.config.cycle_interval_minutes
                );
                // The stop signal releases the inter-cycle sleep promptly.
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(
                        this.config.cycle_interval_minutes * 60,
                    )) => {}
                    _ = this.stop_signal.notified() => {}
                }
            }

            info!("Detection loop stopped");
        });
    }

    /// Ask the scheduler to stop. The in-flight cycle runs to completion;
    /// the inter-cycle sleep is released immediately.
    pub async fn stop(&self) {
        info!("Stopping detection loop");
        *self.running.write().await = false;
        self.stop_signal.notify_waiters();
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run one cycle outside the scheduler, for manual or one-shot use.
    pub async fn run_single_cycle(&self) -> anyhow::Result<DetectionCycle> {
        let cycle_id = format!("manual_{}", self.clock.now().format("%Y%m%d_%H%M%S"));
        self.run_cycle(cycle_id).await
    }

    /// Rules with at least one successful deployment. Disabled rules keep
    /// their membership.
    pub async fn deployed_rules(&self) -> HashSet<String> {
        self.deployed_rules.read().await.clone()
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let history = self.cycle_history.read().await;

        let recent_performance = if history.is_empty() {
            None
        } else {
            let recent: Vec<&DetectionCycle> = history
                .iter()
                .skip(history.len().saturating_sub(RECENT_CYCLES))
                .collect();
            let n = recent.len() as f64;
            Some(RecentPerformance {
                avg_incidents_per_cycle: recent
                    .iter()
                    .map(|c| c.incidents_processed as f64)
                    .sum::<f64>()
                    / n,
                avg_rules_deployed_per_cycle: recent
                    .iter()
                    .map(|c| c.rules_deployed as f64)
                    .sum::<f64>()
                    / n,
                success_rate: recent
                    .iter()
                    .filter(|c| c.status == CycleStatus::Completed)
                    .count() as f64
                    / n,
            })
        };

        CoordinatorStatus {
            running: *self.running.read().await,
            current_cycle: self.current_cycle.read().await.clone(),
            total_cycles: history.len(),
            deployed_rules_count: self.deployed_rules.read().await.len(),
            config: self.config.clone(),
            recent_performance,
        }
    }

    /// Recent cycles, oldest first.
    pub async fn cycle_history(&self, limit: usize) -> Vec<DetectionCycle> {
        let history = self.cycle_history.read().await;
        history
            .iter()
            .skip(history.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    async fn run_cycle(&self, cycle_id: String) -> anyhow::Result<DetectionCycle> {
        {
            // Only one cycle may be active per coordinator instance.
            let mut current = self.current_cycle.write().await;
            if current.is_some() {
                anyhow::bail!("a detection cycle is already running");
            }
            *current = Some(DetectionCycle::new(cycle_id.clone(), self.clock.now()));
        }

        info!("Starting detection cycle: {}", cycle_id);
        let mut cycle = DetectionCycle::new(cycle_id.clone(), self.clock.now());

        match self.execute_steps(&mut cycle).await {
            Ok(()) => {
                cycle.status = CycleStatus::Completed;
            }
            Err(e) => {
                error!("Detection cycle {} failed: {}", cycle_id, e);
                cycle.status = CycleStatus::Failed;
                cycle.errors.push(e.to_string());
            }
        }
        cycle.end_time = Some(self.clock.now());

        let duration = cycle
            .end_time
            .map(|end| (end - cycle.start_time).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        info!(
            "Detection cycle {} {} in {:.1}s",
            cycle_id,
            if cycle.status == CycleStatus::Completed {
                "completed"
            } else {
                "failed"
            },
            duration
        );

        self.finish_cycle(cycle.clone()).await;
        Ok(cycle)
    }

    /// The six cycle steps in fixed order. Collaborator outages degrade to
    /// empty results inside each step; an error escaping a step fails the
    /// cycle.
    async fn execute_steps(&self, cycle: &mut DetectionCycle) -> anyhow::Result<()> {
        // Step 1: collect new incidents and candidate rules.
        let (incidents, new_rules) = self.collect_new_detections(cycle).await;
        cycle.incidents_processed = incidents.len();
        info!(
            "Found {} new incidents, {} new rules",
            incidents.len(),
            new_rules.len()
        );
        self.publish_cycle(cycle).await;

        // Step 2: evaluate and deploy qualifying rules.
        if !new_rules.is_empty() {
            cycle.rules_deployed = self.evaluate_and_deploy_rules(new_rules).await;
            info!("Deployed {} new rules", cycle.rules_deployed);
        }
        self.publish_cycle(cycle).await;

        // Step 3: collect feedback on the deployed set.
        let deployed: Vec<String> = {
            let set = self.deployed_rules.read().await;
            let mut ids: Vec<String> = set.iter().cloned().collect();
            ids.sort();
            ids
        };
        cycle.feedback_collected = self
            .feedback
            .collect(Some(&deployed), self.config.performance_window_hours)
            .await;
        info!("Collected feedback on {} rules", cycle.feedback_collected);
        self.publish_cycle(cycle).await;

        // Step 4: monitor performance.
        cycle.performance_scores = self
            .monitor
            .analyze(&deployed, self.config.performance_window_hours)
            .await;
        info!(
            "Analyzed performance of {} rules",
            cycle.performance_scores.len()
        );
        self.publish_cycle(cycle).await;

        // Step 5: tune under-performing rules.
        if self.config.tuning_enabled {
            let deployed_set = self.deployed_rules.read().await.clone();
            cycle.rules_tuned = self
                .tuning
                .tune_rules(&cycle.performance_scores, Some(&deployed_set))
                .await;
            info!("Tuned {} rules", cycle.rules_tuned);
        }
        self.publish_cycle(cycle).await;

        // Step 6: update the knowledge graph. Best-effort.
        self.update_knowledge_graph(&cycle.cycle_id, &incidents, &cycle.performance_scores)
            .await;

        Ok(())
    }

    async fn publish_cycle(&self, cycle: &DetectionCycle) {
        *self.current_cycle.write().await = Some(cycle.clone());
    }

    async fn finish_cycle(&self, cycle: DetectionCycle) {
        {
            let mut history = self.cycle_history.write().await;
            history.push_back(cycle);
            if history.len() > CYCLE_HISTORY_CAP {
                history.pop_front();
            }
        }
        *self.current_cycle.write().await = None;
    }

    /// Pull fresh incidents and extract their valid candidate rules,
    /// annotated with provenance.
    async fn collect_new_detections(
        &self,
        cycle: &mut DetectionCycle,
    ) -> (Vec<Incident>, Vec<RuleRecord>) {
        let Some(source) = &self.incident_source else {
            debug!("No incident source configured");
            return (Vec::new(), Vec::new());
        };

        let since = self.clock.now() - chrono::Duration::hours(self.config.lookback_hours);
        let incidents = match source.fetch_incidents(since).await {
            Ok(incidents) => incidents,
            Err(e) => {
                error!("Failed to collect new detections: {}", e);
                cycle.errors.push(format!("incident collection failed: {}", e));
                return (Vec::new(), Vec::new());
            }
        };

        let mut new_rules = Vec::new();
        for incident in &incidents {
            for rule in &incident.analyst_findings.sigma_rules {
                if !rule.validation.valid {
                    debug!("Skipping invalid rule {}", rule.rule_id);
                    continue;
                }
                let mut rule = rule.clone();
                rule.source_incident = Some(incident.incident_id.clone());
                rule.generated_at = Some(incident.timestamp);
                rule.incident_severity = Some(incident.severity);
                new_rules.push(rule);
            }
        }

        (incidents, new_rules)
    }

    /// Deploy rules that are new, severe enough, and within the per-cycle
    /// cap. Returns the number of successful deployments.
    async fn evaluate_and_deploy_rules(&self, new_rules: Vec<RuleRecord>) -> usize {
        let mut candidates = Vec::new();
        {
            let deployed = self.deployed_rules.read().await;
            for rule in new_rules {
                if deployed.contains(&rule.rule_id) {
                    continue;
                }
                match rule.incident_severity {
                    Some(Severity::High) | Some(Severity::Critical) => candidates.push(rule),
                    _ => debug!(
                        "Skipping rule {} below severity bar",
                        rule.rule_id
                    ),
                }
            }
        }
        candidates.truncate(self.config.max_rules_per_cycle);

        let mut deployed_count = 0;
        for rule in candidates {
            let success = self
                .deployer
                .deploy_rule(
                    &rule,
                    &self.config.detection_engines,
                    self.config.auto_deployment_enabled,
                )
                .await;

            if success {
                deployed_count += 1;
                self.deployed_rules.write().await.insert(rule.rule_id.clone());
                info!("Deployed rule {}: {}", rule.rule_id, rule.title);
            }
        }

        deployed_count
    }

    async fn update_knowledge_graph(
        &self,
        cycle_id: &str,
        incidents: &[Incident],
        performance_scores: &HashMap<String, f64>,
    ) {
        for incident in incidents {
            if let Err(e) = self
                .knowledge_graph
                .upsert_cycle(
                    &incident.incident_id,
                    cycle_id,
                    incident.analyst_findings.sigma_rules.len(),
                )
                .await
            {
                warn!("Failed to update knowledge graph: {}", e);
            }
        }

        for (rule_id, score) in performance_scores {
            if let Err(e) = self.knowledge_graph.upsert_rule_score(rule_id, *score).await {
                warn!("Failed to update rule score in knowledge graph: {}", e);
            }
        }

        debug!(
            "Updated knowledge graph with {} incidents and {} rule scores",
            incidents.len(),
            performance_scores.len()
        );
    }
}
