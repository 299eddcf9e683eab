// src/tuning/optimizer.rs
//! Rule diagnosis and mutation
//!
//! The optimizer inspects a rule's metrics and feedback, emits typed tuning
//! recommendations, and applies them to a deep copy of the rule body. Every
//! mutation is deterministic given (rule, recommendation) and idempotent:
//! re-applying a recommendation to its own output yields the same body.

use chrono::{DateTime, Utc};
use log::{debug, error};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::feedback::{FeedbackItem, FeedbackKind};
use crate::types::{Clock, RuleRecord, RuleValidation, Severity, SigmaDocument};

/// Fields mined from false-positive alert data.
const FP_PATTERN_FIELDS: [&str; 4] = ["process.name", "source.ip", "user.name", "host.name"];
/// Fields mined from true-positive alert data.
const TP_PATTERN_FIELDS: [&str; 3] = ["event.category", "event.action", "network.protocol"];

const FP_RATE_CEILING: f64 = 0.30;
const ALERT_FREQUENCY_CEILING: f64 = 10.0;
const PERFORMANCE_FLOOR: f64 = 0.5;
const MIN_FP_SAMPLES_FOR_WHITELIST: usize = 5;
const COUNT_THRESHOLD_CAP: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningStrategy {
    ThresholdAdjustment,
    FieldRefinement,
    TimeframeOptimization,
    ConditionSimplification,
    CorrelationEnhancement,
    NoiseReduction,
}

impl TuningStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningStrategy::ThresholdAdjustment => "threshold_adjustment",
            TuningStrategy::FieldRefinement => "field_refinement",
            TuningStrategy::TimeframeOptimization => "timeframe_optimization",
            TuningStrategy::ConditionSimplification => "condition_simplification",
            TuningStrategy::CorrelationEnhancement => "correlation_enhancement",
            TuningStrategy::NoiseReduction => "noise_reduction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningAction {
    ModifyRule,
    DisableRule,
    CreateVariant,
    AddWhitelist,
    AdjustSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A recurring pattern mined from feedback alert data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPattern {
    pub fields: BTreeMap<String, String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountCondition {
    pub threshold: u32,
    pub timeframe: String,
}

/// Strategy-specific structured diff carried by a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedChanges {
    NoiseReduction {
        /// Clauses to negate in the condition, e.g. `process.name:"chrome.exe"`.
        exclusions: Vec<String>,
        /// Advisory: the rule lacks an event.category filter.
        add_event_category: bool,
    },
    ThresholdAdjustment {
        /// Rewrite an existing `count() > N` to this value.
        count_threshold: Option<u32>,
        /// Introduce a count aggregation when none exists.
        add_count_condition: Option<CountCondition>,
    },
    FieldRefinement {
        /// Fields recurring in true positives but absent from the rule.
        additional_conditions: BTreeMap<String, String>,
        /// Wildcard values replaced with their bare literal.
        wildcard_refinements: BTreeMap<String, String>,
    },
    Whitelist {
        pattern: FeedbackPattern,
    },
    SeverityAdjustment {
        new_level: Severity,
    },
    Disable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningRecommendation {
    pub recommendation_id: String,
    pub rule_id: String,
    pub strategy: TuningStrategy,
    pub action: TuningAction,
    pub confidence: f64,
    pub description: String,
    pub rationale: String,
    pub proposed_changes: ProposedChanges,
    /// Expected metric deltas if applied.
    pub estimated_impact: BTreeMap<String, f64>,
    pub risk_assessment: RiskLevel,
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub rule_id: String,
    pub recommendation_id: String,
    pub action_taken: TuningAction,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_rule_id: Option<String>,
    #[serde(default)]
    pub applied_changes: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Metric slice the optimizer diagnoses against.
#[derive(Debug, Clone, Default)]
pub struct RuleTuningMetrics {
    pub performance_score: f64,
    pub false_positive_rate: f64,
    pub alert_frequency: f64,
}

/// Outcome of applying a recommendation: the result record plus the mutated
/// rule (when the action rewrites the body) for the caller to persist.
#[derive(Debug, Clone)]
pub struct TuningApplication {
    pub result: TuningResult,
    pub updated_rule: Option<RuleRecord>,
}

/// Diagnosis + application for one rule type. The structured rule body is
/// the baseline; other rule types plug in here.
pub trait TuningOptimizer: Send + Sync {
    fn analyze_rule(
        &self,
        rule: &RuleRecord,
        metrics: &RuleTuningMetrics,
        feedback: &[FeedbackItem],
    ) -> Vec<TuningRecommendation>;

    fn apply_recommendation(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> TuningApplication;
}

pub struct SigmaTuningOptimizer {
    clock: Arc<dyn Clock>,
}

impl SigmaTuningOptimizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn recommend_noise_reduction(
        &self,
        rule_id: &str,
        doc: &SigmaDocument,
        fp_rate: f64,
        fp_patterns: &[FeedbackPattern],
    ) -> TuningRecommendation {
        let exclusions: Vec<String> = fp_patterns
            .iter()
            .take(3)
            .filter_map(pattern_clause)
            .collect();

        TuningRecommendation {
            recommendation_id: format!("{}_{}", rule_id, TuningStrategy::NoiseReduction.as_str()),
            rule_id: rule_id.to_string(),
            strategy: TuningStrategy::NoiseReduction,
            action: TuningAction::ModifyRule,
            confidence: 0.8,
            description: format!("Reduce false positive rate from {:.3}", fp_rate),
            rationale: format!(
                "High false positive rate ({:.3}) causing alert fatigue",
                fp_rate
            ),
            proposed_changes: ProposedChanges::NoiseReduction {
                exclusions,
                add_event_category: !doc.detection.selection.contains_key("event.category"),
            },
            estimated_impact: impact(&[
                ("false_positive_rate", -0.3),
                ("alert_frequency", -0.2),
                ("precision", 0.2),
            ]),
            risk_assessment: RiskLevel::Low,
            requires_approval: false,
        }
    }

    fn recommend_threshold_adjustment(
        &self,
        rule_id: &str,
        doc: &SigmaDocument,
        alert_frequency: f64,
    ) -> TuningRecommendation {
        let proposed_changes = match current_count_threshold(&doc.detection.condition) {
            Some(current) => ProposedChanges::ThresholdAdjustment {
                count_threshold: Some((current * 2).min(COUNT_THRESHOLD_CAP)),
                add_count_condition: None,
            },
            None => ProposedChanges::ThresholdAdjustment {
                count_threshold: None,
                add_count_condition: Some(CountCondition {
                    threshold: 5,
                    timeframe: "5m".to_string(),
                }),
            },
        };

        TuningRecommendation {
            recommendation_id: format!(
                "{}_{}",
                rule_id,
                TuningStrategy::ThresholdAdjustment.as_str()
            ),
            rule_id: rule_id.to_string(),
            strategy: TuningStrategy::ThresholdAdjustment,
            action: TuningAction::ModifyRule,
            confidence: 0.9,
            description: format!("Reduce alert frequency from {:.1}/hour", alert_frequency),
            rationale: format!(
                "High alert frequency ({:.1}/hour) causing alert overload",
                alert_frequency
            ),
            proposed_changes,
            estimated_impact: impact(&[("alert_frequency", -0.5), ("precision", 0.1)]),
            risk_assessment: RiskLevel::Low,
            requires_approval: false,
        }
    }

    fn recommend_field_refinement(
        &self,
        rule_id: &str,
        doc: &SigmaDocument,
        performance_score: f64,
        feedback: &[FeedbackItem],
    ) -> TuningRecommendation {
        // Fields recurring across true positives and absent from the rule
        // are candidates to add.
        let mut additional_conditions = BTreeMap::new();
        for (field, (value, count)) in recurring_tp_fields(feedback) {
            if count >= 2 && !doc.detection.selection.contains_key(&field) {
                additional_conditions.insert(field, value);
            }
        }

        let mut wildcard_refinements = BTreeMap::new();
        for (field, value) in &doc.detection.selection {
            if let serde_yaml::Value::String(s) = value {
                if s.contains('*') {
                    let literal: String = s.chars().filter(|c| *c != '*').collect();
                    if !literal.is_empty() {
                        wildcard_refinements.insert(field.clone(), literal);
                    }
                }
            }
        }

        TuningRecommendation {
            recommendation_id: format!("{}_{}", rule_id, TuningStrategy::FieldRefinement.as_str()),
            rule_id: rule_id.to_string(),
            strategy: TuningStrategy::FieldRefinement,
            action: TuningAction::ModifyRule,
            confidence: 0.7,
            description: format!("Improve performance score from {:.3}", performance_score),
            rationale: format!(
                "Low performance score ({:.3}) suggests the rule needs refinement",
                performance_score
            ),
            proposed_changes: ProposedChanges::FieldRefinement {
                additional_conditions,
                wildcard_refinements,
            },
            estimated_impact: impact(&[("precision", 0.15), ("false_positive_rate", -0.1)]),
            risk_assessment: RiskLevel::Medium,
            requires_approval: true,
        }
    }

    fn recommend_whitelists(
        &self,
        rule_id: &str,
        fp_patterns: &[FeedbackPattern],
    ) -> Vec<TuningRecommendation> {
        fp_patterns
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, pattern)| TuningRecommendation {
                recommendation_id: format!("{}_whitelist_{}", rule_id, i + 1),
                rule_id: rule_id.to_string(),
                strategy: TuningStrategy::NoiseReduction,
                action: TuningAction::AddWhitelist,
                confidence: 0.8,
                description: format!("Add whitelist for false positive pattern #{}", i + 1),
                rationale: format!("Pattern appears in {} false positives", pattern.count),
                proposed_changes: ProposedChanges::Whitelist {
                    pattern: pattern.clone(),
                },
                estimated_impact: impact(&[("false_positive_rate", -0.2)]),
                risk_assessment: RiskLevel::Low,
                requires_approval: false,
            })
            .collect()
    }

    fn modify_rule(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
        as_variant: bool,
    ) -> TuningApplication {
        let mut doc = match rule.parse_body() {
            Ok(doc) => doc,
            Err(e) => return self.failure(rule, recommendation, e.to_string()),
        };

        let mut applied = BTreeMap::new();

        match &recommendation.proposed_changes {
            ProposedChanges::NoiseReduction {
                exclusions,
                add_event_category,
            } => {
                for clause in exclusions {
                    let negated = format!("NOT ({})", clause);
                    if !doc.detection.condition.contains(&negated) {
                        doc.detection.condition =
                            format!("({}) AND {}", doc.detection.condition, negated);
                    }
                }
                applied.insert("added_exclusions".to_string(), serde_json::json!(exclusions));
                if *add_event_category {
                    applied.insert("add_event_category".to_string(), serde_json::json!(true));
                }
            }
            ProposedChanges::ThresholdAdjustment {
                count_threshold,
                add_count_condition,
            } => {
                if let Some(threshold) = count_threshold {
                    let re = Regex::new(r"count\(\)\s*>\s*\d+").expect("static count pattern");
                    if re.is_match(&doc.detection.condition) {
                        doc.detection.condition = re
                            .replace(&doc.detection.condition, format!("count() > {}", threshold))
                            .into_owned();
                    } else {
                        doc.detection.condition =
                            format!("{} | count() > {}", doc.detection.condition, threshold);
                    }
                    applied.insert("count_threshold".to_string(), serde_json::json!(threshold));
                }
                if let Some(count) = add_count_condition {
                    if !doc.detection.condition.contains("count()") {
                        doc.detection.condition =
                            format!("{} | count() > {}", doc.detection.condition, count.threshold);
                        doc.detection.timeframe = Some(count.timeframe.clone());
                    }
                    applied.insert(
                        "added_count_condition".to_string(),
                        serde_json::json!(count),
                    );
                }
            }
            ProposedChanges::FieldRefinement {
                additional_conditions,
                wildcard_refinements,
            } => {
                for (field, value) in additional_conditions {
                    doc.detection
                        .selection
                        .insert(field.clone(), serde_yaml::Value::String(value.clone()));
                    applied.insert(
                        format!("added_{}", field),
                        serde_json::json!(value),
                    );
                }
                for (field, literal) in wildcard_refinements {
                    let still_wildcard = matches!(
                        doc.detection.selection.get(field),
                        Some(serde_yaml::Value::String(s)) if s.contains('*')
                    );
                    if still_wildcard {
                        doc.detection.selection.insert(
                            field.clone(),
                            serde_yaml::Value::String(literal.clone()),
                        );
                        applied.insert(format!("refined_{}", field), serde_json::json!(literal));
                    }
                }
            }
            other => {
                return self.failure(
                    rule,
                    recommendation,
                    format!("unsupported changes for modify_rule: {:?}", other),
                );
            }
        }

        self.finish_body_mutation(rule, recommendation, doc, applied, as_variant, true)
    }

    fn disable_rule(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> TuningApplication {
        let mut doc = match rule.parse_body() {
            Ok(doc) => doc,
            Err(e) => return self.failure(rule, recommendation, e.to_string()),
        };
        doc.status = Some("disabled".to_string());

        let mut applied = BTreeMap::new();
        applied.insert("disabled".to_string(), serde_json::json!(true));
        self.finish_body_mutation(rule, recommendation, doc, applied, false, false)
    }

    fn adjust_severity(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> TuningApplication {
        let ProposedChanges::SeverityAdjustment { new_level } = &recommendation.proposed_changes
        else {
            return self.failure(rule, recommendation, "missing severity in proposed changes");
        };

        let mut doc = match rule.parse_body() {
            Ok(doc) => doc,
            Err(e) => return self.failure(rule, recommendation, e.to_string()),
        };
        doc.level = Some(*new_level);

        let mut applied = BTreeMap::new();
        applied.insert("new_level".to_string(), serde_json::json!(new_level.as_str()));
        self.finish_body_mutation(rule, recommendation, doc, applied, false, false)
    }

    fn add_whitelist(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> TuningApplication {
        let ProposedChanges::Whitelist { pattern } = &recommendation.proposed_changes else {
            return self.failure(rule, recommendation, "missing pattern in proposed changes");
        };

        // Whitelist entries live alongside the rule; the body is untouched.
        let mut applied = BTreeMap::new();
        applied.insert("whitelist_added".to_string(), serde_json::json!(true));
        applied.insert(
            "whitelist_pattern".to_string(),
            serde_json::to_value(pattern).unwrap_or(serde_json::Value::Null),
        );

        TuningApplication {
            result: TuningResult {
                rule_id: rule.rule_id.clone(),
                recommendation_id: recommendation.recommendation_id.clone(),
                action_taken: recommendation.action,
                success: true,
                new_rule_id: None,
                applied_changes: applied,
                error_message: None,
                timestamp: self.clock.now(),
            },
            updated_rule: None,
        }
    }

    /// Serialize the mutated body, re-validate it, and assemble the updated
    /// record. Validation failure discards the mutation.
    fn finish_body_mutation(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
        doc: SigmaDocument,
        applied: BTreeMap<String, serde_json::Value>,
        as_variant: bool,
        mark_tuned: bool,
    ) -> TuningApplication {
        let new_yaml = match doc.to_yaml() {
            Ok(yaml) => yaml,
            Err(e) => return self.failure(rule, recommendation, e.to_string()),
        };

        let validation = RuleValidation::check(&new_yaml);
        if !validation.valid {
            return self.failure(
                rule,
                recommendation,
                format!(
                    "modified rule validation failed: {}",
                    validation.errors.join("; ")
                ),
            );
        }

        let new_rule_id = if as_variant {
            format!(
                "{}_variant_{}",
                rule.rule_id,
                recommendation.strategy.as_str()
            )
        } else {
            rule.rule_id.clone()
        };

        let mut updated = rule.clone();
        updated.rule_id = new_rule_id.clone();
        updated.rule_yaml = new_yaml;
        updated.validation = validation;
        updated.generated_at = Some(self.clock.now());
        if mark_tuned && !updated.title.ends_with("(Tuned)") {
            updated.title = format!("{} (Tuned)", updated.title);
        }

        TuningApplication {
            result: TuningResult {
                rule_id: rule.rule_id.clone(),
                recommendation_id: recommendation.recommendation_id.clone(),
                action_taken: recommendation.action,
                success: true,
                new_rule_id: Some(new_rule_id),
                applied_changes: applied,
                error_message: None,
                timestamp: self.clock.now(),
            },
            updated_rule: Some(updated),
        }
    }

    fn failure(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
        error: impl Into<String>,
    ) -> TuningApplication {
        let error = error.into();
        error!(
            "Failed to apply {} to rule {}: {}",
            recommendation.recommendation_id, rule.rule_id, error
        );
        TuningApplication {
            result: TuningResult {
                rule_id: rule.rule_id.clone(),
                recommendation_id: recommendation.recommendation_id.clone(),
                action_taken: recommendation.action,
                success: false,
                new_rule_id: None,
                applied_changes: BTreeMap::new(),
                error_message: Some(error),
                timestamp: self.clock.now(),
            },
            updated_rule: None,
        }
    }
}

impl TuningOptimizer for SigmaTuningOptimizer {
    fn analyze_rule(
        &self,
        rule: &RuleRecord,
        metrics: &RuleTuningMetrics,
        feedback: &[FeedbackItem],
    ) -> Vec<TuningRecommendation> {
        let doc = match rule.parse_body() {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to parse rule {} for tuning: {}", rule.rule_id, e);
                return Vec::new();
            }
        };

        let fp_feedback: Vec<&FeedbackItem> = feedback
            .iter()
            .filter(|f| f.kind == FeedbackKind::FalsePositive)
            .collect();
        let fp_patterns = extract_fp_patterns(&fp_feedback);

        let mut recommendations = Vec::new();

        if metrics.false_positive_rate > FP_RATE_CEILING {
            recommendations.push(self.recommend_noise_reduction(
                &rule.rule_id,
                &doc,
                metrics.false_positive_rate,
                &fp_patterns,
            ));
        }

        if metrics.alert_frequency > ALERT_FREQUENCY_CEILING {
            recommendations.push(self.recommend_threshold_adjustment(
                &rule.rule_id,
                &doc,
                metrics.alert_frequency,
            ));
        }

        if metrics.performance_score < PERFORMANCE_FLOOR {
            recommendations.push(self.recommend_field_refinement(
                &rule.rule_id,
                &doc,
                metrics.performance_score,
                feedback,
            ));
        }

        if fp_feedback.len() >= MIN_FP_SAMPLES_FOR_WHITELIST {
            recommendations.extend(self.recommend_whitelists(&rule.rule_id, &fp_patterns));
        }

        debug!(
            "Generated {} tuning recommendations for rule {}",
            recommendations.len(),
            rule.rule_id
        );
        recommendations
    }

    fn apply_recommendation(
        &self,
        rule: &RuleRecord,
        recommendation: &TuningRecommendation,
    ) -> TuningApplication {
        match recommendation.action {
            TuningAction::ModifyRule => self.modify_rule(rule, recommendation, false),
            TuningAction::CreateVariant => self.modify_rule(rule, recommendation, true),
            TuningAction::AddWhitelist => self.add_whitelist(rule, recommendation),
            TuningAction::DisableRule => self.disable_rule(rule, recommendation),
            TuningAction::AdjustSeverity => self.adjust_severity(rule, recommendation),
        }
    }
}

fn impact(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// First mined field in priority order becomes the exclusion clause.
fn pattern_clause(pattern: &FeedbackPattern) -> Option<String> {
    FP_PATTERN_FIELDS.iter().find_map(|field| {
        pattern
            .fields
            .get(*field)
            .map(|value| format!("{}:\"{}\"", field, value))
    })
}

fn current_count_threshold(condition: &str) -> Option<u32> {
    let re = Regex::new(r"count\(\)\s*>\s*(\d+)").expect("static count pattern");
    re.captures(condition)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn alert_data_fields(item: &FeedbackItem, wanted: &[&str]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    if let Some(alert_data) = item.details.get("alert_data").and_then(|v| v.as_object()) {
        for field in wanted {
            if let Some(value) = alert_data.get(*field).and_then(|v| v.as_str()) {
                fields.insert(field.to_string(), value.to_string());
            }
        }
    }
    fields
}

/// Group false-positive alert patterns by field similarity and rank them by
/// recurrence. Input order determines grouping, so callers should pass
/// feedback in a stable order.
pub fn extract_fp_patterns(fp_feedback: &[&FeedbackItem]) -> Vec<FeedbackPattern> {
    let mut grouped: Vec<FeedbackPattern> = Vec::new();

    for item in fp_feedback {
        let fields = alert_data_fields(item, &FP_PATTERN_FIELDS);
        if fields.is_empty() {
            continue;
        }

        match grouped
            .iter_mut()
            .find(|existing| patterns_similar(&existing.fields, &fields))
        {
            Some(existing) => existing.count += 1,
            None => grouped.push(FeedbackPattern { fields, count: 1 }),
        }
    }

    grouped.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.fields.cmp(&b.fields)));
    grouped.truncate(5);
    grouped
}

/// (field -> (value, occurrences)) over true-positive alert data, keeping
/// the most frequent value per field.
fn recurring_tp_fields(feedback: &[FeedbackItem]) -> BTreeMap<String, (String, u64)> {
    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    for item in feedback {
        if item.kind != FeedbackKind::TruePositive {
            continue;
        }
        for (field, value) in alert_data_fields(item, &TP_PATTERN_FIELDS) {
            *counts.entry((field, value)).or_insert(0) += 1;
        }
    }

    let mut best: BTreeMap<String, (String, u64)> = BTreeMap::new();
    for ((field, value), count) in counts {
        match best.get(&field) {
            Some((_, existing)) if *existing >= count => {}
            _ => {
                best.insert(field, (value, count));
            }
        }
    }
    best
}

/// Two patterns match when at least 70% of their shared fields agree.
fn patterns_similar(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> bool {
    let common: Vec<&String> = a.keys().filter(|k| b.contains_key(*k)).collect();
    if common.is_empty() {
        return false;
    }
    let matches = common.iter().filter(|k| a[**k] == b[**k]).count();
    matches as f64 / common.len() as f64 >= 0.7
}
