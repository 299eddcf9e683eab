// src/monitor/mod.rs
//! Rule performance monitor
//!
//! Keeps per-rule rolling series of alert rate, precision, processing time
//! and resource efficiency in hourly buckets, classifies the precision
//! trend, derives a composite health score, and raises alerts against a
//! configurable threshold table.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::MonitorThresholds;
use crate::sources::AlertMetricsSource;
use crate::types::Clock;

/// Cap on stored points per rule per metric (two weeks of hourly buckets).
const SERIES_CAP: usize = 336;
/// Points considered for trend analysis.
const TREND_WINDOW: usize = 72;
/// Points considered "recent" for rate-style derivations.
const RECENT_WINDOW: usize = 24;
/// Minimum points before a trend or reliability is computed.
const MIN_TREND_POINTS: usize = 10;
const MIN_RELIABILITY_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Single point in a per-rule metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            metadata: HashMap::new(),
        }
    }
}

/// The metric series the monitor maintains per rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    AlertFrequency,
    Precision,
    ProcessingTime,
    Efficiency,
}

/// Trend of the precision series over the last up-to-72 points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub rule_id: String,
    pub metric_name: String,
    pub trend: PerformanceTrend,
    pub trend_strength: f64,
    pub current_value: f64,
    /// Change per day, assuming hourly points.
    pub change_rate: f64,
    pub volatility: f64,
    pub confidence: f64,
}

/// A threshold violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub kind: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

/// Composite health for one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleHealth {
    pub rule_id: String,
    pub overall_health_score: f64,
    pub performance_score: f64,
    pub reliability_score: f64,
    pub efficiency_score: f64,
    pub coverage_score: f64,
    /// Alerts per hour.
    pub alert_frequency: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
    /// Seconds.
    pub mean_time_to_detection: f64,
    pub performance_trend: PerformanceTrend,
    pub trend_confidence: f64,
    pub health_alerts: Vec<HealthAlert>,
    pub last_updated: DateTime<Utc>,
    pub evaluation_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub total_rules: usize,
    pub rules: BTreeMap<String, RuleHealth>,
    pub summary: HealthSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    pub healthy_rules: usize,
    pub warning_rules: usize,
    pub critical_rules: usize,
    pub avg_health_score: f64,
    pub total_alerts: usize,
}

#[derive(Debug, Default)]
struct RuleSeries {
    alert_frequency: VecDeque<TimeSeriesPoint>,
    precision: VecDeque<TimeSeriesPoint>,
    processing_time: VecDeque<TimeSeriesPoint>,
    efficiency: VecDeque<TimeSeriesPoint>,
}

impl RuleSeries {
    fn series_mut(&mut self, metric: Metric) -> &mut VecDeque<TimeSeriesPoint> {
        match metric {
            Metric::AlertFrequency => &mut self.alert_frequency,
            Metric::Precision => &mut self.precision,
            Metric::ProcessingTime => &mut self.processing_time,
            Metric::Efficiency => &mut self.efficiency,
        }
    }

    fn push(&mut self, metric: Metric, point: TimeSeriesPoint) {
        let series = self.series_mut(metric);
        series.push_back(point);
        if series.len() > SERIES_CAP {
            series.pop_front();
        }
    }
}

pub struct PerformanceMonitor {
    clock: Arc<dyn Clock>,
    source: Option<Arc<dyn AlertMetricsSource>>,
    thresholds: Arc<RwLock<MonitorThresholds>>,
    series: Arc<RwLock<HashMap<String, Arc<RwLock<RuleSeries>>>>>,
    health_cache: Arc<RwLock<HashMap<String, RuleHealth>>>,
    trend_cache: Arc<RwLock<HashMap<String, TrendAnalysis>>>,
}

impl PerformanceMonitor {
    pub fn new(clock: Arc<dyn Clock>, source: Option<Arc<dyn AlertMetricsSource>>) -> Self {
        Self::with_thresholds(clock, source, MonitorThresholds::default())
    }

    pub fn with_thresholds(
        clock: Arc<dyn Clock>,
        source: Option<Arc<dyn AlertMetricsSource>>,
        thresholds: MonitorThresholds,
    ) -> Self {
        info!("Rule performance monitor initialized");
        Self {
            clock,
            source,
            thresholds: Arc::new(RwLock::new(thresholds)),
            series: Arc::new(RwLock::new(HashMap::new())),
            health_cache: Arc::new(RwLock::new(HashMap::new())),
            trend_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ingest fresh hourly buckets and derive health for each rule.
    /// Returns the overall health score per rule that has data.
    pub async fn analyze(&self, rule_ids: &[String], window_hours: i64) -> HashMap<String, f64> {
        let mut results = HashMap::new();
        if rule_ids.is_empty() {
            return results;
        }

        self.ingest(rule_ids, window_hours).await;

        for rule_id in rule_ids {
            if let Some(health) = self.compute_health(rule_id, window_hours).await {
                results.insert(rule_id.clone(), health.overall_health_score);
                self.health_cache
                    .write()
                    .await
                    .insert(rule_id.clone(), health);
            }
        }

        info!("Analyzed performance for {} rules", results.len());
        results
    }

    /// Append a point to a rule's metric series. Also the seam the alert
    /// ingestion uses internally.
    pub async fn record_point(&self, rule_id: &str, metric: Metric, point: TimeSeriesPoint) {
        let series = {
            let mut map = self.series.write().await;
            map.entry(rule_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(RuleSeries::default())))
                .clone()
        };
        series.write().await.push(metric, point);
    }

    /// Cached health for one rule.
    pub async fn health(&self, rule_id: &str) -> Option<RuleHealth> {
        self.health_cache.read().await.get(rule_id).cloned()
    }

    /// Cached precision trend for one rule.
    pub async fn trend(&self, rule_id: &str) -> Option<TrendAnalysis> {
        self.trend_cache.read().await.get(rule_id).cloned()
    }

    pub async fn thresholds(&self) -> MonitorThresholds {
        self.thresholds.read().await.clone()
    }

    pub async fn update_thresholds(&self, thresholds: MonitorThresholds) {
        *self.thresholds.write().await = thresholds;
        info!("Updated performance thresholds");
    }

    /// Aggregate health report over the given rules (default: every cached
    /// rule).
    pub async fn health_report(&self, rule_ids: Option<Vec<String>>) -> HealthReport {
        let cache = self.health_cache.read().await;
        let rule_ids = rule_ids.unwrap_or_else(|| {
            let mut ids: Vec<String> = cache.keys().cloned().collect();
            ids.sort();
            ids
        });

        let mut rules = BTreeMap::new();
        let mut summary = HealthSummary::default();
        let mut total_score = 0.0;

        for rule_id in &rule_ids {
            if let Some(health) = cache.get(rule_id) {
                total_score += health.overall_health_score;
                summary.total_alerts += health.health_alerts.len();
                if health.overall_health_score >= 0.8 {
                    summary.healthy_rules += 1;
                } else if health.overall_health_score >= 0.6 {
                    summary.warning_rules += 1;
                } else {
                    summary.critical_rules += 1;
                }
                rules.insert(rule_id.clone(), health.clone());
            }
        }

        if !rules.is_empty() {
            summary.avg_health_score = total_score / rules.len() as f64;
        }

        HealthReport {
            generated_at: self.clock.now(),
            total_rules: rule_ids.len(),
            rules,
            summary,
        }
    }

    pub async fn clear(&self) {
        self.series.write().await.clear();
        self.health_cache.write().await.clear();
        self.trend_cache.write().await.clear();
        info!("Performance monitor caches cleared");
    }

    async fn ingest(&self, rule_ids: &[String], window_hours: i64) {
        let Some(source) = &self.source else {
            debug!("No alert metrics source configured; skipping ingestion");
            return;
        };

        let since = self.clock.now() - chrono::Duration::hours(window_hours);

        match source.hourly_alert_metrics(rule_ids, since).await {
            Ok(rows) => {
                for row in rows {
                    let mut freq_point = TimeSeriesPoint::new(row.hour, row.alert_count as f64);
                    freq_point.metadata.insert(
                        "avg_confidence".to_string(),
                        serde_json::json!(row.avg_confidence),
                    );
                    self.record_point(&row.rule_id, Metric::AlertFrequency, freq_point)
                        .await;

                    let classified = row.true_positives + row.false_positives;
                    if classified > 0 {
                        let precision = row.true_positives as f64 / classified as f64;
                        let mut point = TimeSeriesPoint::new(row.hour, precision);
                        point.metadata.insert(
                            "true_positives".to_string(),
                            serde_json::json!(row.true_positives),
                        );
                        point.metadata.insert(
                            "false_positives".to_string(),
                            serde_json::json!(row.false_positives),
                        );
                        self.record_point(&row.rule_id, Metric::Precision, point).await;
                    }

                    if let Some(ms) = row.avg_processing_time_ms {
                        self.record_point(
                            &row.rule_id,
                            Metric::ProcessingTime,
                            TimeSeriesPoint::new(row.hour, ms),
                        )
                        .await;
                    }
                }
            }
            Err(e) => error!("Failed to collect alert metrics: {}", e),
        }

        match source.hourly_resource_usage(rule_ids, since).await {
            Ok(rows) => {
                for row in rows {
                    let cpu_score = (1.0 - row.cpu_percent / 100.0).max(0.0);
                    let memory_score = (1.0 - row.memory_mb / 1000.0).max(0.0);
                    let efficiency = (cpu_score + memory_score) / 2.0;

                    let mut point = TimeSeriesPoint::new(row.hour, efficiency);
                    point
                        .metadata
                        .insert("cpu_percent".to_string(), serde_json::json!(row.cpu_percent));
                    point
                        .metadata
                        .insert("memory_mb".to_string(), serde_json::json!(row.memory_mb));
                    self.record_point(&row.rule_id, Metric::Efficiency, point).await;
                }
            }
            // Resource rows are optional; their absence is not a failure.
            Err(e) => debug!("Resource metrics not available: {}", e),
        }
    }

    async fn compute_health(&self, rule_id: &str, window_hours: i64) -> Option<RuleHealth> {
        let series = {
            let map = self.series.read().await;
            map.get(rule_id)?.clone()
        };
        let series = series.read().await;

        let window_points = window_hours.max(1) as usize;

        let performance_score = mean_last(&series.precision, RECENT_WINDOW).unwrap_or(0.5);
        let reliability_score = reliability(&series.precision, window_points);
        let efficiency_score = mean_last(&series.efficiency, RECENT_WINDOW).unwrap_or(0.8);

        let alert_frequency = mean_last(&series.alert_frequency, window_points).unwrap_or(0.0);
        let coverage_score = coverage(mean_last(&series.alert_frequency, RECENT_WINDOW));

        let recent_precision = mean_last(&series.precision, RECENT_WINDOW);
        let false_positive_rate = recent_precision.map(|p| (1.0 - p).max(0.0)).unwrap_or(0.0);
        // Same proxy as the false-positive rate; without labelled misses the
        // precision series is the only accuracy signal available.
        let true_positive_rate = recent_precision.unwrap_or(0.0);

        let mean_time_to_detection = mean_last(&series.processing_time, RECENT_WINDOW)
            .map(|ms| ms / 1000.0)
            .unwrap_or(300.0);

        let trend_analysis = analyze_trend(rule_id, &series.precision);
        if let Some(analysis) = &trend_analysis {
            self.trend_cache
                .write()
                .await
                .insert(rule_id.to_string(), analysis.clone());
        }
        let (performance_trend, trend_confidence, volatility) = trend_analysis
            .as_ref()
            .map(|t| (t.trend, t.confidence, t.volatility))
            .unwrap_or((PerformanceTrend::Stable, 0.0, 0.0));

        let overall_health_score = performance_score * 0.30
            + reliability_score * 0.25
            + efficiency_score * 0.20
            + coverage_score * 0.25;

        let thresholds = self.thresholds.read().await;
        let health_alerts = generate_health_alerts(
            &thresholds,
            performance_score,
            reliability_score,
            false_positive_rate,
            true_positive_rate,
            alert_frequency,
            volatility,
        );
        if !health_alerts.is_empty() {
            warn!(
                "Rule {} raised {} health alerts",
                rule_id,
                health_alerts.len()
            );
        }

        Some(RuleHealth {
            rule_id: rule_id.to_string(),
            overall_health_score,
            performance_score,
            reliability_score,
            efficiency_score,
            coverage_score,
            alert_frequency,
            false_positive_rate,
            true_positive_rate,
            mean_time_to_detection,
            performance_trend,
            trend_confidence,
            health_alerts,
            last_updated: self.clock.now(),
            evaluation_hours: window_hours,
        })
    }
}

fn mean_last(series: &VecDeque<TimeSeriesPoint>, n: usize) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let skip = series.len().saturating_sub(n);
    let values: Vec<f64> = series.iter().skip(skip).map(|p| p.value).collect();
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Consistency of the precision series: zero deviation is perfect, two
/// tenths of deviation already zeroes the score. Neutral with few samples.
fn reliability(precision: &VecDeque<TimeSeriesPoint>, window: usize) -> f64 {
    if precision.len() < MIN_RELIABILITY_POINTS {
        return 0.5;
    }
    let skip = precision.len().saturating_sub(window);
    let values: Vec<f64> = precision.iter().skip(skip).map(|p| p.value).collect();
    (1.0 - 2.0 * std_dev(&values)).clamp(0.0, 1.0)
}

/// Coverage prefers 0.5..=5 alerts/hour; scaled down on either side.
fn coverage(recent_frequency: Option<f64>) -> f64 {
    let Some(freq) = recent_frequency else {
        return 0.5;
    };
    if (0.5..=5.0).contains(&freq) {
        1.0
    } else if freq < 0.5 {
        (freq / 0.5).clamp(0.0, 1.0)
    } else {
        (5.0 / freq).max(0.1)
    }
}

/// Least-squares slope + volatility over the last up-to-72 precision
/// points. Volatility wins over a flat slope when classifying.
fn analyze_trend(rule_id: &str, precision: &VecDeque<TimeSeriesPoint>) -> Option<TrendAnalysis> {
    if precision.len() < MIN_TREND_POINTS {
        return None;
    }

    let skip = precision.len().saturating_sub(TREND_WINDOW);
    let values: Vec<f64> = precision.iter().skip(skip).map(|p| p.value).collect();
    let n = values.len() as f64;

    let sum_x: f64 = (0..values.len()).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|x| (x as f64).powi(2)).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let volatility = std_dev(&values);

    let trend = if volatility > 0.2 {
        PerformanceTrend::Volatile
    } else if slope.abs() < 0.001 {
        PerformanceTrend::Stable
    } else if slope > 0.0 {
        PerformanceTrend::Improving
    } else {
        PerformanceTrend::Declining
    };

    Some(TrendAnalysis {
        rule_id: rule_id.to_string(),
        metric_name: "precision".to_string(),
        trend,
        trend_strength: (slope.abs() * 100.0).min(1.0),
        current_value: *values.last().unwrap(),
        change_rate: slope * 24.0,
        volatility,
        confidence: (1.0 - 2.0 * volatility).max(0.0),
    })
}

#[allow(clippy::too_many_arguments)]
fn generate_health_alerts(
    thresholds: &MonitorThresholds,
    performance_score: f64,
    reliability_score: f64,
    false_positive_rate: f64,
    true_positive_rate: f64,
    alert_frequency: f64,
    volatility: f64,
) -> Vec<HealthAlert> {
    let mut alerts = Vec::new();

    if performance_score < thresholds.min_performance_score {
        alerts.push(HealthAlert {
            severity: AlertSeverity::High,
            kind: "low_performance".to_string(),
            metric: "performance_score".to_string(),
            value: performance_score,
            threshold: thresholds.min_performance_score,
            message: format!(
                "Rule performance score ({:.3}) below threshold ({})",
                performance_score, thresholds.min_performance_score
            ),
        });
    }

    if false_positive_rate > thresholds.max_false_positive_rate {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Medium,
            kind: "high_false_positives".to_string(),
            metric: "false_positive_rate".to_string(),
            value: false_positive_rate,
            threshold: thresholds.max_false_positive_rate,
            message: format!(
                "False positive rate ({:.3}) above threshold ({})",
                false_positive_rate, thresholds.max_false_positive_rate
            ),
        });
    }

    if true_positive_rate < thresholds.min_true_positive_rate {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Medium,
            kind: "low_true_positives".to_string(),
            metric: "true_positive_rate".to_string(),
            value: true_positive_rate,
            threshold: thresholds.min_true_positive_rate,
            message: format!(
                "True positive rate ({:.3}) below threshold ({})",
                true_positive_rate, thresholds.min_true_positive_rate
            ),
        });
    }

    if alert_frequency > thresholds.max_alert_frequency {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Medium,
            kind: "high_alert_frequency".to_string(),
            metric: "alert_frequency".to_string(),
            value: alert_frequency,
            threshold: thresholds.max_alert_frequency,
            message: format!(
                "Alert frequency ({:.1}/hour) above threshold ({})",
                alert_frequency, thresholds.max_alert_frequency
            ),
        });
    }

    if reliability_score < thresholds.min_reliability_score {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Low,
            kind: "low_reliability".to_string(),
            metric: "reliability_score".to_string(),
            value: reliability_score,
            threshold: thresholds.min_reliability_score,
            message: format!(
                "Reliability score ({:.3}) below threshold ({})",
                reliability_score, thresholds.min_reliability_score
            ),
        });
    }

    if volatility > thresholds.max_volatility {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Low,
            kind: "high_volatility".to_string(),
            metric: "volatility".to_string(),
            value: volatility,
            threshold: thresholds.max_volatility,
            message: format!(
                "Precision volatility ({:.3}) above threshold ({})",
                volatility, thresholds.max_volatility
            ),
        });
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{AlertMetricsRow, MemoryMetricsSource};
    use crate::types::FixedClock;
    use chrono::TimeZone;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap()))
    }

    fn hour(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap() - chrono::Duration::hours(offset)
    }

    async fn feed_precision(monitor: &PerformanceMonitor, rule: &str, values: &[f64]) {
        for (i, value) in values.iter().enumerate() {
            monitor
                .record_point(
                    rule,
                    Metric::Precision,
                    TimeSeriesPoint::new(hour((values.len() - i) as i64), *value),
                )
                .await;
        }
    }

    #[tokio::test]
    async fn empty_rule_set_yields_empty_scores() {
        let monitor = PerformanceMonitor::new(clock(), None);
        let scores = monitor.analyze(&[], 168).await;
        assert!(scores.is_empty());
    }

    #[tokio::test]
    async fn step_up_series_classifies_as_improving() {
        let monitor = PerformanceMonitor::new(clock(), None);
        let mut values = vec![0.5; 36];
        values.extend(vec![0.9; 36]);
        feed_precision(&monitor, "r1", &values).await;

        let scores = monitor
            .analyze(&["r1".to_string()], 168)
            .await;
        assert!(scores.contains_key("r1"));

        let trend = monitor.trend("r1").await.unwrap();
        assert_eq!(trend.trend, PerformanceTrend::Improving);
        assert!(trend.trend_strength > 0.0);
        assert!(trend.confidence > 0.0);
        assert!(trend.change_rate > 0.0);
    }

    #[tokio::test]
    async fn trend_is_deterministic() {
        let values: Vec<f64> = (0..48).map(|i| 0.4 + (i as f64) * 0.005).collect();

        let monitor_a = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor_a, "r", &values).await;
        monitor_a.analyze(&["r".to_string()], 168).await;
        let trend_a = monitor_a.trend("r").await.unwrap();

        let monitor_b = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor_b, "r", &values).await;
        monitor_b.analyze(&["r".to_string()], 168).await;
        let trend_b = monitor_b.trend("r").await.unwrap();

        assert_eq!(trend_a.trend, trend_b.trend);
        assert_eq!(trend_a.trend_strength, trend_b.trend_strength);
        assert_eq!(trend_a.volatility, trend_b.volatility);
    }

    #[tokio::test]
    async fn alternating_series_is_volatile() {
        let monitor = PerformanceMonitor::new(clock(), None);
        let values: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 0.1 } else { 0.9 }).collect();
        feed_precision(&monitor, "r", &values).await;
        monitor.analyze(&["r".to_string()], 168).await;

        let trend = monitor.trend("r").await.unwrap();
        assert_eq!(trend.trend, PerformanceTrend::Volatile);
    }

    #[tokio::test]
    async fn flat_series_is_stable() {
        let monitor = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor, "r", &vec![0.8; 30]).await;
        monitor.analyze(&["r".to_string()], 168).await;

        let trend = monitor.trend("r").await.unwrap();
        assert_eq!(trend.trend, PerformanceTrend::Stable);
    }

    #[test]
    fn coverage_boundaries() {
        assert_eq!(coverage(Some(0.5)), 1.0);
        assert_eq!(coverage(Some(5.0)), 1.0);
        assert!((coverage(Some(0.25)) - 0.5).abs() < 1e-9);
        assert!((coverage(Some(10.0)) - 0.5).abs() < 1e-9);
        assert!((coverage(Some(100.0)) - 0.1).abs() < 1e-9);
        assert_eq!(coverage(None), 0.5);
    }

    #[tokio::test]
    async fn health_score_is_the_documented_weighted_sum() {
        let monitor = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor, "r", &vec![0.9; 30]).await;
        for i in 0..30 {
            monitor
                .record_point(
                    "r",
                    Metric::AlertFrequency,
                    TimeSeriesPoint::new(hour(30 - i), 2.0),
                )
                .await;
        }

        monitor.analyze(&["r".to_string()], 168).await;
        let health = monitor.health("r").await.unwrap();

        let expected = health.performance_score * 0.30
            + health.reliability_score * 0.25
            + health.efficiency_score * 0.20
            + health.coverage_score * 0.25;
        assert!((health.overall_health_score - expected).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&health.overall_health_score));

        // 0.9 flat precision, 2/hour frequency, no efficiency data.
        assert!((health.performance_score - 0.9).abs() < 1e-9);
        assert!((health.reliability_score - 1.0).abs() < 1e-9);
        assert!((health.efficiency_score - 0.8).abs() < 1e-9);
        assert!((health.coverage_score - 1.0).abs() < 1e-9);
        assert!((health.false_positive_rate - 0.1).abs() < 1e-9);
        assert_eq!(health.mean_time_to_detection, 300.0);
    }

    #[tokio::test]
    async fn few_precision_samples_keep_reliability_neutral() {
        let monitor = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor, "r", &[0.2, 0.9, 0.4]).await;
        for i in 0..3 {
            monitor
                .record_point(
                    "r",
                    Metric::AlertFrequency,
                    TimeSeriesPoint::new(hour(3 - i), 1.0),
                )
                .await;
        }
        monitor.analyze(&["r".to_string()], 168).await;
        let health = monitor.health("r").await.unwrap();
        assert_eq!(health.reliability_score, 0.5);
    }

    #[tokio::test]
    async fn threshold_violations_raise_alerts() {
        let monitor = PerformanceMonitor::new(clock(), None);
        // Precision 0.3: performance and tp-rate low, fp-rate high.
        feed_precision(&monitor, "r", &vec![0.3; 30]).await;
        // 20 alerts/hour: too frequent.
        for i in 0..30 {
            monitor
                .record_point(
                    "r",
                    Metric::AlertFrequency,
                    TimeSeriesPoint::new(hour(30 - i), 20.0),
                )
                .await;
        }

        monitor.analyze(&["r".to_string()], 168).await;
        let health = monitor.health("r").await.unwrap();

        let kinds: Vec<&str> = health.health_alerts.iter().map(|a| a.kind.as_str()).collect();
        assert!(kinds.contains(&"low_performance"));
        assert!(kinds.contains(&"high_false_positives"));
        assert!(kinds.contains(&"low_true_positives"));
        assert!(kinds.contains(&"high_alert_frequency"));

        for alert in &health.health_alerts {
            assert!(!alert.message.is_empty());
        }
    }

    #[tokio::test]
    async fn ingestion_builds_series_from_source() {
        let source = Arc::new(MemoryMetricsSource::new());
        for i in 0..12 {
            source
                .push_alert_row(AlertMetricsRow {
                    rule_id: "r".to_string(),
                    hour: hour(12 - i),
                    alert_count: 3,
                    true_positives: 8,
                    false_positives: 2,
                    avg_confidence: 0.9,
                    avg_processing_time_ms: Some(1500.0),
                })
                .await;
        }

        let monitor = PerformanceMonitor::new(clock(), Some(source));
        let scores = monitor.analyze(&["r".to_string()], 24).await;
        assert!(scores.contains_key("r"));

        let health = monitor.health("r").await.unwrap();
        assert!((health.performance_score - 0.8).abs() < 1e-9);
        assert!((health.alert_frequency - 3.0).abs() < 1e-9);
        assert!((health.mean_time_to_detection - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn health_report_buckets_rules() {
        let monitor = PerformanceMonitor::new(clock(), None);
        feed_precision(&monitor, "good", &vec![0.95; 30]).await;
        for i in 0..30 {
            monitor
                .record_point(
                    "good",
                    Metric::AlertFrequency,
                    TimeSeriesPoint::new(hour(30 - i), 2.0),
                )
                .await;
        }
        feed_precision(&monitor, "bad", &vec![0.2; 30]).await;

        monitor
            .analyze(&["good".to_string(), "bad".to_string()], 168)
            .await;
        let report = monitor.health_report(None).await;

        assert_eq!(report.total_rules, 2);
        assert_eq!(report.summary.healthy_rules, 1);
        assert!(report.summary.avg_health_score > 0.0);
        assert!(report.rules.contains_key("good"));
    }
}
