// src/engines/mock.rs
//! Mock adapter used for validation-only fan-out and tests.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{Clock, RuleRecord};

use super::{DeploymentResult, DeploymentTarget, DetectionEngineAdapter, EngineType};

pub struct MockAdapter {
    clock: Arc<dyn Clock>,
}

impl MockAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl DetectionEngineAdapter for MockAdapter {
    fn engine_type(&self) -> EngineType {
        EngineType::Mock
    }

    fn translate(&self, rule: &RuleRecord) -> Result<String> {
        Ok(format!("mock::{}", rule.rule_id))
    }

    async fn probe(&self, _target: &DeploymentTarget) -> bool {
        true
    }

    async fn deploy(&self, rule: &RuleRecord, target: &DeploymentTarget) -> DeploymentResult {
        let deployed_rule_id = if target.is_dry_run() {
            None
        } else {
            Some(format!("mock_{}", rule.rule_id))
        };

        DeploymentResult {
            rule_id: rule.rule_id.clone(),
            target_name: target.name.clone(),
            success: true,
            deployed_rule_id,
            deployment_time: Some(self.clock.now()),
            error_message: None,
            converted_rule: Some(format!("mock::{}", rule.rule_id)),
        }
    }
}
