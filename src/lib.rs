//! # Continuous Detection-Rule Improvement Loop
//!
//! A library for continuously improving a fleet of detection rules across
//! heterogeneous security analytics engines. A coordinator runs on a
//! cadence; each cycle ingests freshly generated rules from upstream
//! analysis, deploys the qualifying ones, aggregates analyst feedback,
//! scores rule health, and applies automated tuning with a human-approval
//! path for the riskier changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sigmatune::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//!     let config = DetectionLoopConfig::default();
//!
//!     let deployer = Arc::new(RuleDeployer::new(sigmatune::config::default_targets()));
//!     let feedback = Arc::new(FeedbackStore::new(clock.clone(), None));
//!     let monitor = Arc::new(PerformanceMonitor::new(clock.clone(), None));
//!     let tuning = Arc::new(ContinuousTuningEngine::new(
//!         TuningConfig::default(),
//!         Arc::new(sigmatune::sources::MemoryRuleRepository::new()),
//!         feedback.clone(),
//!         monitor.clone(),
//!         Arc::new(SigmaTuningOptimizer::new(clock.clone())),
//!     ));
//!
//!     let coordinator = Arc::new(DetectionLoopCoordinator::new(
//!         config, clock, None, None, deployer, feedback, monitor, tuning,
//!     ));
//!
//!     coordinator.clone().start().await;
//!     tokio::signal::ctrl_c().await?;
//!     coordinator.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod deploy;
pub mod engines;
pub mod feedback;
pub mod monitor;
pub mod sources;
pub mod tuning;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{DetectionLoopConfig, MonitorThresholds, TuningConfig};
    pub use crate::coordinator::{CoordinatorStatus, CycleStatus, DetectionCycle, DetectionLoopCoordinator};
    pub use crate::deploy::RuleDeployer;
    pub use crate::engines::{
        DeploymentResult, DeploymentTarget, DetectionEngineAdapter, EngineType,
    };
    pub use crate::feedback::{FeedbackItem, FeedbackKind, FeedbackStore, RulePerformance};
    pub use crate::monitor::{PerformanceMonitor, PerformanceTrend, RuleHealth};
    pub use crate::sources::{
        AlertMetricsSource, FeedbackSink, IncidentSource, KnowledgeGraphSink, RuleRepository,
    };
    pub use crate::tuning::{
        ContinuousTuningEngine, SigmaTuningOptimizer, TuningOptimizer, TuningRecommendation,
        TuningResult,
    };
    pub use crate::types::{Clock, RuleRecord, Severity, SigmaDocument, SystemClock};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
