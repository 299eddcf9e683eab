// src/feedback/mod.rs
//! Feedback store
//!
//! Append-only per-rule feedback log with an optional durable sink behind
//! it. Derives rolling precision/recall/F1 and the composite performance
//! score per rule. Submission is linearizable per rule id: a `performance`
//! call observes every `submit` that returned before it.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::sources::FeedbackSink;
use crate::types::Clock;

/// Analyst/automation judgment kinds for a single alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    TruePositive,
    FalsePositive,
    BenignPositive,
    MissedDetection,
    PerformanceIssue,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::TruePositive => "true_positive",
            FeedbackKind::FalsePositive => "false_positive",
            FeedbackKind::BenignPositive => "benign_positive",
            FeedbackKind::MissedDetection => "missed_detection",
            FeedbackKind::PerformanceIssue => "performance_issue",
        }
    }
}

/// Individual feedback item for a detection rule. Never mutated once
/// submitted; duplicates are the caller's problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub feedback_id: String,
    pub rule_id: String,
    pub kind: FeedbackKind,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst_notes: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl FeedbackItem {
    pub fn new(
        rule_id: impl Into<String>,
        kind: FeedbackKind,
        source: impl Into<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            feedback_id: Uuid::new_v4().to_string(),
            rule_id: rule_id.into(),
            kind,
            timestamp,
            source: source.into(),
            confidence,
            alert_id: None,
            incident_id: None,
            analyst_notes: None,
            details: serde_json::Value::Null,
        }
    }

    /// Analyst-sourced true positive for a specific alert.
    pub fn true_positive(
        rule_id: impl Into<String>,
        alert_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut item = Self::new(rule_id, FeedbackKind::TruePositive, "analyst", 1.0, timestamp);
        item.alert_id = Some(alert_id.into());
        item
    }

    /// Analyst-sourced false positive for a specific alert.
    pub fn false_positive(
        rule_id: impl Into<String>,
        alert_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut item = Self::new(rule_id, FeedbackKind::FalsePositive, "analyst", 1.0, timestamp);
        item.alert_id = Some(alert_id.into());
        item
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Derived performance metrics for one rule over an evaluation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePerformance {
    pub rule_id: String,
    pub evaluation_hours: i64,
    pub total_alerts: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub benign_positives: u64,
    pub missed_detections: u64,
    pub precision: f64,
    /// Estimated: `TP / max(TP + missed_detections, 1)`. Without ground
    /// truth, missed detections are only as complete as the feedback, so
    /// this tracks precision more closely than a true recall would.
    pub recall: f64,
    pub f1_score: f64,
    pub alert_volume_score: f64,
    pub performance_score: f64,
    pub last_updated: DateTime<Utc>,
    pub feedback_sources: HashMap<String, u64>,
}

/// Aggregate report over a set of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub generated_at: DateTime<Utc>,
    pub evaluation_hours: i64,
    pub total_rules_analyzed: usize,
    pub rules: HashMap<String, RulePerformance>,
    pub summary: FeedbackSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub avg_performance_score: f64,
    pub high_performers: Vec<String>,
    pub poor_performers: Vec<String>,
    pub total_feedback_items: usize,
    pub feedback_by_kind: HashMap<String, u64>,
    pub feedback_by_source: HashMap<String, u64>,
}

/// Per-rule counts and latest activity, for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFeedbackSummary {
    pub rule_id: String,
    pub total_feedback_items: usize,
    pub feedback_by_kind: HashMap<String, u64>,
    pub feedback_by_source: HashMap<String, u64>,
    pub latest_feedback: Option<DateTime<Utc>>,
    pub performance: Option<RulePerformance>,
}

const DEFAULT_EVALUATION_HOURS: i64 = 168;

pub struct FeedbackStore {
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn FeedbackSink>>,
    log: Arc<RwLock<HashMap<String, Vec<FeedbackItem>>>>,
    performance_cache: Arc<RwLock<HashMap<String, RulePerformance>>>,
}

impl FeedbackStore {
    pub fn new(clock: Arc<dyn Clock>, sink: Option<Arc<dyn FeedbackSink>>) -> Self {
        info!(
            "Feedback store initialized ({} durable sink)",
            if sink.is_some() { "with" } else { "no" }
        );
        Self {
            clock,
            sink,
            log: Arc::new(RwLock::new(HashMap::new())),
            performance_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a feedback item to the per-rule log and mirror it to the
    /// durable sink when one is configured. Sink failures are absorbed.
    pub async fn submit(&self, item: FeedbackItem) -> Result<()> {
        if item.rule_id.is_empty() {
            bail!("feedback item is missing a rule_id");
        }
        if item.feedback_id.is_empty() {
            bail!("feedback item is missing a feedback_id");
        }
        if !(0.0..=1.0).contains(&item.confidence) {
            bail!("feedback confidence {} outside [0, 1]", item.confidence);
        }

        {
            let mut log = self.log.write().await;
            log.entry(item.rule_id.clone()).or_default().push(item.clone());
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(&item).await {
                warn!("Failed to mirror feedback {} to sink: {}", item.feedback_id, e);
            }
        }

        info!("Feedback submitted for rule {}: {}", item.rule_id, item.kind.as_str());
        Ok(())
    }

    /// Pull feedback newer than `now - lookback_hours` from the durable
    /// sink into the in-memory log. Returns the number of items loaded.
    pub async fn collect(&self, rule_ids: Option<&[String]>, lookback_hours: i64) -> usize {
        let Some(sink) = &self.sink else {
            warn!("No durable sink available for feedback collection");
            return 0;
        };

        let since = self.clock.now() - chrono::Duration::hours(lookback_hours);
        let items = match sink.read(since, rule_ids).await {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to collect feedback from sink: {}", e);
                return 0;
            }
        };

        let count = items.len();
        let mut log = self.log.write().await;
        for item in items {
            log.entry(item.rule_id.clone()).or_default().push(item);
        }

        info!(
            "Collected {} feedback items for {} rules",
            count,
            rule_ids.map(|r| r.len()).unwrap_or(0)
        );
        count
    }

    /// Rolling performance metrics for a rule, or None when the window
    /// holds no feedback at all (undefined, not zero).
    pub async fn performance(&self, rule_id: &str, evaluation_hours: i64) -> Option<RulePerformance> {
        let now = self.clock.now();
        let cutoff = now - chrono::Duration::hours(evaluation_hours);

        let windowed: Vec<FeedbackItem> = {
            let log = self.log.read().await;
            log.get(rule_id)?
                .iter()
                .filter(|fb| fb.timestamp >= cutoff)
                .cloned()
                .collect()
        };

        if windowed.is_empty() {
            debug!("No feedback found for rule {}", rule_id);
            return None;
        }

        let metrics = compute_performance(rule_id, &windowed, evaluation_hours, now);

        debug!(
            "Rule {} performance: {:.3} (P: {:.3}, R: {:.3}, F1: {:.3})",
            rule_id, metrics.performance_score, metrics.precision, metrics.recall, metrics.f1_score
        );

        self.performance_cache
            .write()
            .await
            .insert(rule_id.to_string(), metrics.clone());
        Some(metrics)
    }

    /// Aggregate report over the given rules (default: every rule with a
    /// cached performance entry).
    pub async fn report(&self, rule_ids: Option<Vec<String>>) -> FeedbackReport {
        let rule_ids = match rule_ids {
            Some(ids) => ids,
            None => {
                let cache = self.performance_cache.read().await;
                let mut ids: Vec<String> = cache.keys().cloned().collect();
                ids.sort();
                ids
            }
        };

        let mut rules = HashMap::new();
        let mut summary = FeedbackSummary::default();
        let mut total_score = 0.0;

        for rule_id in &rule_ids {
            let cached = self.performance_cache.read().await.get(rule_id).cloned();
            let perf = match cached {
                Some(cached) => Some(cached),
                None => self.performance(rule_id, DEFAULT_EVALUATION_HOURS).await,
            };

            if let Some(perf) = perf {
                total_score += perf.performance_score;
                if perf.performance_score > 0.8 {
                    summary.high_performers.push(rule_id.clone());
                } else if perf.performance_score < 0.5 {
                    summary.poor_performers.push(rule_id.clone());
                }
                rules.insert(rule_id.clone(), perf);
            }

            let log = self.log.read().await;
            if let Some(items) = log.get(rule_id) {
                summary.total_feedback_items += items.len();
                for item in items {
                    *summary
                        .feedback_by_kind
                        .entry(item.kind.as_str().to_string())
                        .or_insert(0) += 1;
                    *summary
                        .feedback_by_source
                        .entry(item.source.clone())
                        .or_insert(0) += 1;
                }
            }
        }

        if !rules.is_empty() {
            summary.avg_performance_score = total_score / rules.len() as f64;
        }

        info!(
            "Feedback report: {} rules, avg score {:.3}, {} high / {} poor performers",
            rules.len(),
            summary.avg_performance_score,
            summary.high_performers.len(),
            summary.poor_performers.len()
        );

        FeedbackReport {
            generated_at: self.clock.now(),
            evaluation_hours: DEFAULT_EVALUATION_HOURS,
            total_rules_analyzed: rule_ids.len(),
            rules,
            summary,
        }
    }

    /// Rules whose cached performance falls below the score floor and that
    /// have enough classified alerts to be worth acting on.
    pub async fn identify_problematic(&self, min_score: f64, min_alerts: u64) -> Vec<String> {
        let cache = self.performance_cache.read().await;
        let mut problematic: Vec<String> = cache
            .values()
            .filter(|m| m.total_alerts >= min_alerts && m.performance_score < min_score)
            .map(|m| m.rule_id.clone())
            .collect();
        problematic.sort();

        for rule_id in &problematic {
            info!("Problematic rule identified: {}", rule_id);
        }
        problematic
    }

    /// All feedback for a rule, oldest first.
    pub async fn all_feedback(&self, rule_id: &str) -> Vec<FeedbackItem> {
        let log = self.log.read().await;
        log.get(rule_id).cloned().unwrap_or_default()
    }

    /// Counts and latest activity for one rule, or None when nothing has
    /// been recorded for it.
    pub async fn rule_feedback_summary(&self, rule_id: &str) -> Option<RuleFeedbackSummary> {
        let log = self.log.read().await;
        let items = log.get(rule_id).filter(|items| !items.is_empty())?;

        let mut by_kind = HashMap::new();
        let mut by_source = HashMap::new();
        for item in items {
            *by_kind.entry(item.kind.as_str().to_string()).or_insert(0) += 1;
            *by_source.entry(item.source.clone()).or_insert(0) += 1;
        }

        let performance = self.performance_cache.read().await.get(rule_id).cloned();

        Some(RuleFeedbackSummary {
            rule_id: rule_id.to_string(),
            total_feedback_items: items.len(),
            feedback_by_kind: by_kind,
            feedback_by_source: by_source,
            latest_feedback: items.iter().map(|i| i.timestamp).max(),
            performance,
        })
    }

    pub async fn clear(&self) {
        self.log.write().await.clear();
        self.performance_cache.write().await.clear();
        info!("Feedback cache cleared");
    }
}

fn compute_performance(
    rule_id: &str,
    items: &[FeedbackItem],
    evaluation_hours: i64,
    now: DateTime<Utc>,
) -> RulePerformance {
    let mut counts: HashMap<FeedbackKind, u64> = HashMap::new();
    let mut sources: HashMap<String, u64> = HashMap::new();
    for item in items {
        *counts.entry(item.kind).or_insert(0) += 1;
        *sources.entry(item.source.clone()).or_insert(0) += 1;
    }

    let tp = *counts.get(&FeedbackKind::TruePositive).unwrap_or(&0);
    let fp = *counts.get(&FeedbackKind::FalsePositive).unwrap_or(&0);
    let bp = *counts.get(&FeedbackKind::BenignPositive).unwrap_or(&0);
    let missed = *counts.get(&FeedbackKind::MissedDetection).unwrap_or(&0);

    let total_alerts = tp + fp + bp;
    let precision = if total_alerts > 0 {
        tp as f64 / total_alerts as f64
    } else {
        0.0
    };
    let recall = tp as f64 / (tp + missed).max(1) as f64;
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    // Penalize silent rules and noisy rules alike.
    let alerts_per_day = total_alerts as f64 / (evaluation_hours as f64 / 24.0).max(1.0);
    let alert_volume_score = if alerts_per_day < 0.1 {
        alerts_per_day * 10.0
    } else if alerts_per_day > 50.0 {
        (50.0 / alerts_per_day).max(0.1)
    } else {
        1.0
    };

    let performance_score =
        precision * 0.4 + recall * 0.3 + f1_score * 0.2 + alert_volume_score * 0.1;

    RulePerformance {
        rule_id: rule_id.to_string(),
        evaluation_hours,
        total_alerts,
        true_positives: tp,
        false_positives: fp,
        benign_positives: bp,
        missed_detections: missed,
        precision,
        recall,
        f1_score,
        alert_volume_score,
        performance_score,
        last_updated: now,
        feedback_sources: sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MemoryFeedbackSink;
    use crate::types::FixedClock;
    use chrono::TimeZone;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
    }

    fn item(rule: &str, kind: FeedbackKind, hours_ago: i64, now: DateTime<Utc>) -> FeedbackItem {
        FeedbackItem::new(rule, kind, "analyst", 0.9, now - chrono::Duration::hours(hours_ago))
    }

    #[tokio::test]
    async fn submit_then_performance_includes_item() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        store
            .submit(item("r1", FeedbackKind::TruePositive, 1, now))
            .await
            .unwrap();
        store
            .submit(item("r1", FeedbackKind::FalsePositive, 2, now))
            .await
            .unwrap();

        let perf = store.performance("r1", 24).await.unwrap();
        assert_eq!(perf.total_alerts, 2);
        assert_eq!(perf.true_positives, 1);
        assert_eq!(perf.false_positives, 1);
        assert!((perf.precision - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_feedback_means_undefined_performance() {
        let store = FeedbackStore::new(clock(), None);
        assert!(store.performance("ghost", 24).await.is_none());
    }

    #[tokio::test]
    async fn feedback_outside_window_is_ignored() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        store
            .submit(item("r1", FeedbackKind::TruePositive, 300, now))
            .await
            .unwrap();
        assert!(store.performance("r1", 24).await.is_none());
        assert!(store.performance("r1", 400).await.is_some());
    }

    #[tokio::test]
    async fn confidence_out_of_range_is_rejected() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        let mut bad = item("r1", FeedbackKind::TruePositive, 0, now);
        bad.confidence = 1.5;
        assert!(store.submit(bad).await.is_err());
    }

    #[tokio::test]
    async fn scores_stay_in_unit_interval() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        for i in 0..20 {
            let kind = match i % 4 {
                0 => FeedbackKind::TruePositive,
                1 => FeedbackKind::FalsePositive,
                2 => FeedbackKind::BenignPositive,
                _ => FeedbackKind::MissedDetection,
            };
            store.submit(item("r1", kind, i, now)).await.unwrap();
        }

        let perf = store.performance("r1", 48).await.unwrap();
        assert!((0.0..=1.0).contains(&perf.precision));
        assert!((0.0..=1.0).contains(&perf.recall));
        assert!((0.0..=1.0).contains(&perf.f1_score));
        assert!((0.0..=1.0).contains(&perf.performance_score));
        assert_eq!(
            perf.total_alerts,
            perf.true_positives + perf.false_positives + perf.benign_positives
        );
    }

    #[tokio::test]
    async fn volume_score_penalizes_silence_and_noise() {
        let clock = clock();
        let now = clock.now();

        // One alert over 15 days: under 0.1/day.
        let quiet = vec![item("q", FeedbackKind::TruePositive, 1, now)];
        let perf = compute_performance("q", &quiet, 360, now);
        assert!(perf.alert_volume_score < 1.0);
        assert!((perf.alert_volume_score - (1.0 / 15.0) * 10.0).abs() < 1e-9);

        // 120 alerts in a day: over 50/day.
        let noisy: Vec<FeedbackItem> = (0..120)
            .map(|_| item("n", FeedbackKind::FalsePositive, 1, now))
            .collect();
        let perf = compute_performance("n", &noisy, 24, now);
        assert!((perf.alert_volume_score - 50.0 / 120.0).abs() < 1e-9);

        // Comfortable middle ground.
        let steady: Vec<FeedbackItem> = (0..10)
            .map(|_| item("s", FeedbackKind::TruePositive, 1, now))
            .collect();
        let perf = compute_performance("s", &steady, 24, now);
        assert!((perf.alert_volume_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn only_missed_detections_yield_zero_precision_not_none() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        store
            .submit(item("r1", FeedbackKind::MissedDetection, 1, now))
            .await
            .unwrap();
        let perf = store.performance("r1", 24).await.unwrap();
        assert_eq!(perf.total_alerts, 0);
        assert_eq!(perf.precision, 0.0);
        assert_eq!(perf.recall, 0.0);
        assert_eq!(perf.f1_score, 0.0);
    }

    #[tokio::test]
    async fn collect_pulls_from_sink() {
        let clock = clock();
        let now = clock.now();
        let sink = Arc::new(MemoryFeedbackSink::new());
        sink.push(item("r1", FeedbackKind::TruePositive, 2, now)).await;
        sink.push(item("r1", FeedbackKind::FalsePositive, 500, now)).await;
        sink.push(item("r2", FeedbackKind::TruePositive, 3, now)).await;

        let store = FeedbackStore::new(clock, Some(sink));
        let rules = vec!["r1".to_string()];
        let count = store.collect(Some(&rules), 24).await;
        assert_eq!(count, 1);
        assert_eq!(store.all_feedback("r1").await.len(), 1);
        assert!(store.all_feedback("r2").await.is_empty());
    }

    #[tokio::test]
    async fn report_summarizes_rules() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        for _ in 0..9 {
            store
                .submit(item("good", FeedbackKind::TruePositive, 1, now))
                .await
                .unwrap();
        }
        for _ in 0..9 {
            store
                .submit(item("bad", FeedbackKind::FalsePositive, 1, now))
                .await
                .unwrap();
        }
        store.performance("good", 24).await.unwrap();
        store.performance("bad", 24).await.unwrap();

        let report = store.report(None).await;
        assert_eq!(report.total_rules_analyzed, 2);
        assert!(report.summary.high_performers.contains(&"good".to_string()));
        assert!(report.summary.poor_performers.contains(&"bad".to_string()));
        assert_eq!(report.summary.total_feedback_items, 18);
        assert_eq!(report.summary.feedback_by_kind["true_positive"], 9);
        assert_eq!(report.summary.feedback_by_source["analyst"], 18);
    }

    #[tokio::test]
    async fn problematic_rules_require_enough_alerts() {
        let clock = clock();
        let now = clock.now();
        let store = FeedbackStore::new(clock, None);

        // Poor score but only 2 alerts: below the floor for action.
        for _ in 0..2 {
            store
                .submit(item("sparse", FeedbackKind::FalsePositive, 1, now))
                .await
                .unwrap();
        }
        // Poor score with enough alerts.
        for _ in 0..8 {
            store
                .submit(item("noisy", FeedbackKind::FalsePositive, 1, now))
                .await
                .unwrap();
        }
        store.performance("sparse", 24).await.unwrap();
        store.performance("noisy", 24).await.unwrap();

        let problematic = store.identify_problematic(0.5, 5).await;
        assert_eq!(problematic, vec!["noisy".to_string()]);
    }
}
