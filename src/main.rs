//! Fraud Scoring Service - Main Entry Point
//!
//! Watches the input directory for CSV batches, scores each one and writes
//! the decision table, importance ranking and score density summary.

use anyhow::{Context, Result};
use fraud_scoring_service::{
    config::{LogFormat, ServiceConfig},
    consumer::InputWatcher,
    service::{InputHandler, ScoringService},
};
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("fraud_scoring_service={}", config.log_level))
    })?;

    let json = config.log_format == LogFormat::Json;
    let stdout = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let file = match &config.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            Some(if json { layer.json().boxed() } else { layer.boxed() })
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = ServiceConfig::load()?;

    // Initialize logging
    init_tracing(&config)?;

    info!("Starting fraud scoring service");
    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        model = %config.resolved_model_path().display(),
        preprocessors = %config.preprocessors_dir.display(),
        threshold = config.score_threshold,
        "Configuration loaded"
    );

    fs::create_dir_all(&config.input_dir)
        .with_context(|| format!("Failed to create input dir {}", config.input_dir.display()))?;

    let mut service = ScoringService::new(&config)?;

    // Files are scored one at a time, in arrival order
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = InputWatcher::start(&config.input_dir, tx)?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    // SIGHUP re-reads the fitted artifacts between files
    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(path) => tokio::task::block_in_place(|| service.handle_input(&path)),
                None => break,
            },
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading artifacts");
                match tokio::task::block_in_place(|| service.reload_artifacts()) {
                    Ok(()) => info!(
                        columns = service.pipeline().column_count(),
                        "Artifacts reloaded"
                    ),
                    Err(e) => error!(error = format!("{:#}", e), "Reload failed, keeping previous artifacts"),
                }
            }
            _ = &mut shutdown => {
                info!("Service interrupted, shutting down");
                break;
            }
        }
    }

    service.metrics().log_summary();
    Ok(())
}
