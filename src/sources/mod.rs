// src/sources/mod.rs
//! Collaborator interfaces
//!
//! The loop talks to the outside world only through these narrow traits:
//! the incident/candidate-rule source, the durable feedback sink, the
//! hourly alert metrics source, the knowledge-graph sink (best-effort) and
//! the rule repository. Memory-backed implementations double as fixtures
//! for tests and for running the loop without external services.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::feedback::FeedbackItem;
use crate::types::{RuleRecord, Severity};

/// An incident surfaced by upstream analysis, possibly carrying candidate
/// detection rules in the analyst findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    #[serde(default)]
    pub analyst_findings: AnalystFindings,
    #[serde(default)]
    pub responder_plan: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalystFindings {
    #[serde(default)]
    pub sigma_rules: Vec<RuleRecord>,
}

/// Hourly-bucketed alert counts for one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMetricsRow {
    pub rule_id: String,
    pub hour: DateTime<Utc>,
    pub alert_count: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub avg_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_processing_time_ms: Option<f64>,
}

/// Hourly-bucketed resource usage for one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsageRow {
    pub rule_id: String,
    pub hour: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_duration_ms: Option<f64>,
}

#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// Incidents newer than `since` that advertise candidate rules.
    async fn fetch_incidents(&self, since: DateTime<Utc>) -> Result<Vec<Incident>>;
}

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn read(
        &self,
        since: DateTime<Utc>,
        rule_ids: Option<&[String]>,
    ) -> Result<Vec<FeedbackItem>>;

    async fn write(&self, item: &FeedbackItem) -> Result<()>;
}

#[async_trait]
pub trait AlertMetricsSource: Send + Sync {
    async fn hourly_alert_metrics(
        &self,
        rule_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertMetricsRow>>;

    async fn hourly_resource_usage(
        &self,
        rule_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<ResourceUsageRow>>;
}

/// Best-effort sink; callers must absorb failures.
#[async_trait]
pub trait KnowledgeGraphSink: Send + Sync {
    async fn upsert_cycle(
        &self,
        incident_id: &str,
        cycle_id: &str,
        rules_count: usize,
    ) -> Result<()>;

    async fn upsert_rule_score(&self, rule_id: &str, score: f64) -> Result<()>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn get_rule(&self, rule_id: &str) -> Result<Option<RuleRecord>>;
    async fn put_rule(&self, rule: RuleRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Memory-backed implementations

#[derive(Default)]
pub struct MemoryIncidentSource {
    incidents: RwLock<Vec<Incident>>,
}

impl MemoryIncidentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, incident: Incident) {
        self.incidents.write().await.push(incident);
    }
}

#[async_trait]
impl IncidentSource for MemoryIncidentSource {
    async fn fetch_incidents(&self, since: DateTime<Utc>) -> Result<Vec<Incident>> {
        let incidents = self.incidents.read().await;
        Ok(incidents
            .iter()
            .filter(|i| i.timestamp >= since && !i.analyst_findings.sigma_rules.is_empty())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryFeedbackSink {
    items: RwLock<Vec<FeedbackItem>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, item: FeedbackItem) {
        self.items.write().await.push(item);
    }
}

#[async_trait]
impl FeedbackSink for MemoryFeedbackSink {
    async fn read(
        &self,
        since: DateTime<Utc>,
        rule_ids: Option<&[String]>,
    ) -> Result<Vec<FeedbackItem>> {
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|item| item.timestamp >= since)
            .filter(|item| {
                rule_ids
                    .map(|ids| ids.iter().any(|id| *id == item.rule_id))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn write(&self, item: &FeedbackItem) -> Result<()> {
        self.items.write().await.push(item.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMetricsSource {
    alert_rows: RwLock<Vec<AlertMetricsRow>>,
    resource_rows: RwLock<Vec<ResourceUsageRow>>,
}

impl MemoryMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_alert_row(&self, row: AlertMetricsRow) {
        self.alert_rows.write().await.push(row);
    }

    pub async fn push_resource_row(&self, row: ResourceUsageRow) {
        self.resource_rows.write().await.push(row);
    }
}

#[async_trait]
impl AlertMetricsSource for MemoryMetricsSource {
    async fn hourly_alert_metrics(
        &self,
        rule_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertMetricsRow>> {
        let rows = self.alert_rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.hour >= since && rule_ids.iter().any(|id| *id == r.rule_id))
            .cloned()
            .collect())
    }

    async fn hourly_resource_usage(
        &self,
        rule_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<ResourceUsageRow>> {
        let rows = self.resource_rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| r.hour >= since && rule_ids.iter().any(|id| *id == r.rule_id))
            .cloned()
            .collect())
    }
}

/// Discards every update. The default when no graph backend is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKnowledgeGraph;

#[async_trait]
impl KnowledgeGraphSink for NullKnowledgeGraph {
    async fn upsert_cycle(&self, _: &str, _: &str, _: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert_rule_score(&self, _: &str, _: f64) -> Result<()> {
        Ok(())
    }
}

/// Records every update, for tests and local inspection.
#[derive(Default)]
pub struct MemoryKnowledgeGraph {
    pub cycles: RwLock<Vec<(String, String, usize)>>,
    pub rule_scores: RwLock<HashMap<String, f64>>,
}

impl MemoryKnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeGraphSink for MemoryKnowledgeGraph {
    async fn upsert_cycle(
        &self,
        incident_id: &str,
        cycle_id: &str,
        rules_count: usize,
    ) -> Result<()> {
        self.cycles
            .write()
            .await
            .push((incident_id.to_string(), cycle_id.to_string(), rules_count));
        Ok(())
    }

    async fn upsert_rule_score(&self, rule_id: &str, score: f64) -> Result<()> {
        self.rule_scores
            .write()
            .await
            .insert(rule_id.to_string(), score);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRuleRepository {
    rules: RwLock<HashMap<String, RuleRecord>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, rule: RuleRecord) {
        self.rules.write().await.insert(rule.rule_id.clone(), rule);
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn get_rule(&self, rule_id: &str) -> Result<Option<RuleRecord>> {
        Ok(self.rules.read().await.get(rule_id).cloned())
    }

    async fn put_rule(&self, rule: RuleRecord) -> Result<()> {
        self.rules.write().await.insert(rule.rule_id.clone(), rule);
        Ok(())
    }
}
