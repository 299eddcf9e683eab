use anyhow::Result;
use log::{info, warn};
use std::env;
use std::path::Path;
use std::sync::Arc;

use sigmatune::config::{self, DetectionLoopConfig, TargetsConfig, TuningConfig};
use sigmatune::coordinator::DetectionLoopCoordinator;
use sigmatune::deploy::RuleDeployer;
use sigmatune::feedback::FeedbackStore;
use sigmatune::monitor::PerformanceMonitor;
use sigmatune::sources::MemoryRuleRepository;
use sigmatune::tuning::{ContinuousTuningEngine, SigmaTuningOptimizer};
use sigmatune::types::{Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting sigmatune v{}", sigmatune::VERSION);

    // Configuration is fatal when present but broken; absent files fall
    // back to defaults so the loop can run offline in validation-only mode.
    let config_path =
        env::var("SIGMATUNE_CONFIG").unwrap_or_else(|_| "config/detection.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        DetectionLoopConfig::load(&config_path)?
    } else {
        warn!("Config file {} not found, using defaults", config_path);
        DetectionLoopConfig::default()
    };

    let targets_path =
        env::var("SIGMATUNE_TARGETS").unwrap_or_else(|_| "config/targets.yaml".to_string());
    let targets = if Path::new(&targets_path).exists() {
        TargetsConfig::load(&targets_path)?
    } else {
        warn!(
            "Targets file {} not found, using endpointless defaults",
            targets_path
        );
        config::default_targets()
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let deployer = Arc::new(RuleDeployer::new(targets));
    let feedback = Arc::new(FeedbackStore::new(clock.clone(), None));
    let monitor = Arc::new(PerformanceMonitor::new(clock.clone(), None));
    let tuning = Arc::new(ContinuousTuningEngine::new(
        TuningConfig::default(),
        Arc::new(MemoryRuleRepository::new()),
        feedback.clone(),
        monitor.clone(),
        Arc::new(SigmaTuningOptimizer::new(clock.clone())),
    ));

    let coordinator = Arc::new(DetectionLoopCoordinator::new(
        config,
        clock,
        None,
        None,
        deployer,
        feedback,
        monitor,
        tuning,
    ));

    coordinator.clone().start().await;
    info!("Detection loop started; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    coordinator.stop().await;

    Ok(())
}
