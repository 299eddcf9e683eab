// src/tuning/mod.rs
//! Continuous tuning engine
//!
//! Selects under-performing rules, asks the optimizer for recommendations,
//! auto-applies the low-risk ones and parks the rest in a pending queue for
//! human approval. Applied outcomes land in a bounded history.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod optimizer;

pub use optimizer::{
    CountCondition, FeedbackPattern, ProposedChanges, RiskLevel, RuleTuningMetrics,
    SigmaTuningOptimizer, TuningAction, TuningApplication, TuningOptimizer,
    TuningRecommendation, TuningResult, TuningStrategy,
};

use crate::config::TuningConfig;
use crate::feedback::FeedbackStore;
use crate::monitor::PerformanceMonitor;
use crate::sources::RuleRepository;
use crate::types::RuleRecord;

/// Applied-tuning history cap.
const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningStatistics {
    pub total_pending_recommendations: usize,
    pub rules_with_pending_recommendations: usize,
    pub total_applied_tunings: usize,
    pub success_rate: f64,
    pub tuning_by_strategy: HashMap<String, u64>,
    pub config: TuningConfig,
}

pub struct ContinuousTuningEngine {
    config: TuningConfig,
    repository: Arc<dyn RuleRepository>,
    feedback: Arc<FeedbackStore>,
    monitor: Arc<PerformanceMonitor>,
    optimizer: Arc<dyn TuningOptimizer>,
    pending: Arc<RwLock<HashMap<String, Vec<TuningRecommendation>>>>,
    history: Arc<RwLock<VecDeque<TuningResult>>>,
    whitelists: Arc<RwLock<HashMap<String, Vec<FeedbackPattern>>>>,
}

impl ContinuousTuningEngine {
    pub fn new(
        config: TuningConfig,
        repository: Arc<dyn RuleRepository>,
        feedback: Arc<FeedbackStore>,
        monitor: Arc<PerformanceMonitor>,
        optimizer: Arc<dyn TuningOptimizer>,
    ) -> Self {
        info!("Continuous tuning engine initialized");
        Self {
            config,
            repository,
            feedback,
            monitor,
            optimizer,
            pending: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(VecDeque::new())),
            whitelists: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Diagnose every under-performing rule, queue the recommendations and
    /// auto-apply the low-risk ones. Returns how many were applied.
    pub async fn tune_rules(
        &self,
        performance_scores: &HashMap<String, f64>,
        deployed_rules: Option<&HashSet<String>>,
    ) -> usize {
        if performance_scores.is_empty() {
            return 0;
        }

        let mut rules_to_tune: Vec<(&String, f64)> = performance_scores
            .iter()
            .filter(|(rule_id, _)| {
                deployed_rules
                    .map(|deployed| deployed.contains(*rule_id))
                    .unwrap_or(true)
            })
            .filter(|(_, score)| **score < self.config.tuning_score_threshold)
            .map(|(rule_id, score)| (rule_id, *score))
            .collect();
        rules_to_tune.sort_by(|a, b| a.0.cmp(b.0));

        info!("Analyzing {} rules for tuning opportunities", rules_to_tune.len());

        let mut applied_count = 0;

        for (rule_id, score) in rules_to_tune {
            let rule = match self.repository.get_rule(rule_id).await {
                Ok(Some(rule)) => rule,
                Ok(None) => {
                    debug!("Rule {} not found in repository; skipping", rule_id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to fetch rule {} for tuning: {}", rule_id, e);
                    continue;
                }
            };

            let feedback = self.feedback.all_feedback(rule_id).await;
            if feedback.len() < self.config.min_feedback_samples {
                debug!(
                    "Insufficient feedback for rule {} ({} < {})",
                    rule_id,
                    feedback.len(),
                    self.config.min_feedback_samples
                );
                continue;
            }

            let metrics = match self.monitor.health(rule_id).await {
                Some(health) => RuleTuningMetrics {
                    performance_score: score,
                    false_positive_rate: health.false_positive_rate,
                    alert_frequency: health.alert_frequency,
                },
                None => RuleTuningMetrics {
                    performance_score: score,
                    ..Default::default()
                },
            };

            let mut recommendations = self.optimizer.analyze_rule(&rule, &metrics, &feedback);
            recommendations.truncate(self.config.max_recommendations_per_rule);
            if recommendations.is_empty() {
                continue;
            }

            info!(
                "Generated {} tuning recommendations for rule {}",
                recommendations.len(),
                rule_id
            );
            self.pending
                .write()
                .await
                .insert(rule_id.clone(), recommendations.clone());

            for recommendation in &recommendations {
                if !self.should_auto_apply(recommendation) {
                    continue;
                }
                if self.apply_and_record(&rule, recommendation).await {
                    applied_count += 1;
                    self.remove_pending(rule_id, &recommendation.recommendation_id)
                        .await;
                    info!("Auto-applied tuning: {}", recommendation.description);
                }
            }
        }

        info!("Auto-applied {} low-risk tuning actions", applied_count);
        applied_count
    }

    /// Approve and apply a pending recommendation. Returns false when the
    /// recommendation is unknown or the apply failed (a failed apply stays
    /// pending).
    pub async fn approve(&self, rule_id: &str, recommendation_id: &str) -> bool {
        let recommendation = {
            let pending = self.pending.read().await;
            pending.get(rule_id).and_then(|recs| {
                recs.iter()
                    .find(|r| r.recommendation_id == recommendation_id)
                    .cloned()
            })
        };

        let Some(recommendation) = recommendation else {
            return false;
        };

        let rule = match self.repository.get_rule(rule_id).await {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                error!("Rule {} not found for approved recommendation", rule_id);
                return false;
            }
            Err(e) => {
                error!("Failed to fetch rule {} for approval: {}", rule_id, e);
                return false;
            }
        };

        if self.apply_and_record(&rule, &recommendation).await {
            self.remove_pending(rule_id, recommendation_id).await;
            info!("Applied approved recommendation: {}", recommendation.description);
            true
        } else {
            false
        }
    }

    /// Pending recommendations per rule.
    pub async fn pending(&self) -> HashMap<String, Vec<TuningRecommendation>> {
        self.pending.read().await.clone()
    }

    /// Most recent applied-tuning outcomes, newest last.
    pub async fn history(&self, limit: usize) -> Vec<TuningResult> {
        let history = self.history.read().await;
        history
            .iter()
            .skip(history.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    /// Whitelist patterns accumulated for a rule.
    pub async fn whitelists(&self, rule_id: &str) -> Vec<FeedbackPattern> {
        self.whitelists
            .read()
            .await
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn statistics(&self) -> TuningStatistics {
        let pending = self.pending.read().await;
        let history = self.history.read().await;

        let mut by_strategy: HashMap<String, u64> = HashMap::new();
        let mut successful = 0usize;
        for result in history.iter() {
            if result.success {
                successful += 1;
            }
            // The strategy is the recommendation id tail after the rule id.
            let strategy = result
                .recommendation_id
                .strip_prefix(&format!("{}_", result.rule_id))
                .unwrap_or(&result.recommendation_id);
            *by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
        }

        TuningStatistics {
            total_pending_recommendations: pending.values().map(Vec::len).sum(),
            rules_with_pending_recommendations: pending.len(),
            total_applied_tunings: history.len(),
            success_rate: successful as f64 / history.len().max(1) as f64,
            tuning_by_strategy: by_strategy,
            config: self.config.clone(),
        }
    }

    fn should_auto_apply(&self, recommendation: &TuningRecommendation) -> bool {
        self.config.auto_apply_low_risk
            && recommendation.risk_assessment == RiskLevel::Low
            && !recommendation.requires_approval
    }

    /// Apply a recommendation, persist the mutated rule, record the outcome.
    /// Returns whether the apply succeeded.
    async fn apply_and_record(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> bool {
        let application = self.optimizer.apply_recommendation(rule, recommendation);
        let success = application.result.success;

        if success {
            if let Some(updated) = application.updated_rule {
                if let Err(e) = self.repository.put_rule(updated).await {
                    error!(
                        "Failed to persist tuned rule {}: {}",
                        recommendation.rule_id, e
                    );
                }
            }
            if recommendation.action == TuningAction::AddWhitelist {
                if let ProposedChanges::Whitelist { pattern } = &recommendation.proposed_changes {
                    self.whitelists
                        .write()
                        .await
                        .entry(rule.rule_id.clone())
                        .or_default()
                        .push(pattern.clone());
                }
            }
        } else {
            error!(
                "Failed to apply tuning {}: {}",
                recommendation.recommendation_id,
                application
                    .result
                    .error_message
                    .as_deref()
                    .unwrap_or("unknown error")
            );
        }

        let mut history = self.history.write().await;
        history.push_back(application.result);
        if history.len() > HISTORY_CAP {
            history.pop_front();
        }

        success
    }

    async fn remove_pending(&self, rule_id: &str, recommendation_id: &str) {
        let mut pending = self.pending.write().await;
        if let Some(recs) = pending.get_mut(rule_id) {
            recs.retain(|r| r.recommendation_id != recommendation_id);
            if recs.is_empty() {
                pending.remove(rule_id);
            }
        }
    }
}
