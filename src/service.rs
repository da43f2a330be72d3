//! File-level scoring service: read a batch, score it, write its artifacts.

use crate::config::ServiceConfig;
use crate::metrics::{ScoreDistribution, ServiceMetrics};
use crate::pipeline::ScoringPipeline;
use crate::producer::{ArtifactWriter, RunArtifacts, RUN_TIMESTAMP_FORMAT};
use crate::types::transaction::read_batch;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// Receiver of "a new input is available" notifications.
///
/// Whatever detects new inputs (a directory watcher, a queue consumer, a
/// test) only needs this one call.
pub trait InputHandler {
    fn handle_input(&self, path: &Path);
}

/// Scores whole files against a loaded pipeline.
pub struct ScoringService {
    pipeline: ScoringPipeline,
    writer: ArtifactWriter,
    threshold: f64,
    top_k: usize,
    histogram_bins: usize,
    metrics: ServiceMetrics,
}

impl ScoringService {
    /// Create the output directory and load the pipeline.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to create output dir {}", config.output_dir.display())
        })?;

        let pipeline = ScoringPipeline::load(config.artifact_paths())
            .context("Failed to load scoring artifacts")?;

        info!(
            output_dir = %config.output_dir.display(),
            threshold = config.score_threshold,
            top_k = config.top_k,
            "Scoring service initialized"
        );

        Ok(Self::with_pipeline(pipeline, config))
    }

    pub fn with_pipeline(pipeline: ScoringPipeline, config: &ServiceConfig) -> Self {
        Self {
            pipeline,
            writer: ArtifactWriter::new(&config.output_dir),
            threshold: config.score_threshold,
            top_k: config.top_k,
            histogram_bins: config.histogram_bins,
            metrics: ServiceMetrics::new(),
        }
    }

    /// Score one file end to end. Nothing is written unless every stage
    /// succeeds.
    pub fn process_file(&self, path: &Path) -> Result<RunArtifacts> {
        let started = Instant::now();
        info!(file = %path.display(), "Processing file");

        let records = read_batch(path)?;
        let result = self.pipeline.score(&records, self.threshold)?;
        let ranking = self.pipeline.top_influential_features(self.top_k);
        let distribution = ScoreDistribution::from_scores(&result.scores, self.histogram_bins);

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let timestamp = Utc::now().format(RUN_TIMESTAMP_FORMAT).to_string();

        let artifacts = self.writer.write_run(
            &stem,
            &timestamp,
            &result.submission(),
            &ranking,
            &distribution,
        )?;

        let elapsed = started.elapsed();
        self.metrics
            .record_file(result.len(), result.positives(), elapsed);

        for written in artifacts.all() {
            info!(path = %written.display(), "Wrote");
        }
        info!(
            file = %path.display(),
            rows = result.len(),
            positives = result.positives(),
            elapsed_ms = elapsed.as_millis() as u64,
            "File scored"
        );

        Ok(artifacts)
    }

    /// Re-read the fitted artifacts without restarting.
    pub fn reload_artifacts(&mut self) -> Result<()> {
        self.pipeline
            .reload()
            .context("Failed to reload scoring artifacts")
    }

    pub fn pipeline(&self) -> &ScoringPipeline {
        &self.pipeline
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }
}

impl InputHandler for ScoringService {
    /// Errors stop this file only; they are logged and the service keeps
    /// accepting inputs.
    fn handle_input(&self, path: &Path) {
        if let Err(e) = self.process_file(path) {
            self.metrics.record_failure();
            error!(file = %path.display(), error = format!("{:#}", e), "Failed processing file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::models::inference::LogisticClassifier;
    use crate::models::preprocess::tests::toy_artifacts;
    use crate::pipeline::tests::{amount_only_classifier, write_artifacts};
    use std::sync::atomic::Ordering;

    const HEADER: &str = "index_col,transaction_time,name_1,name_2,street,one_city,jobs,merch,post_code,amount,lat,lon,merchant_lat,merchant_lon,population_city,cat_id,us_state,gender,target";

    fn service(dir: &Path) -> ScoringService {
        let artifacts = toy_artifacts();
        let classifier = amount_only_classifier(&artifacts);
        let paths = write_artifacts(dir, &artifacts, &classifier);

        let config = ServiceConfig {
            input_dir: dir.join("input"),
            output_dir: dir.join("output"),
            models_dir: dir.join("models"),
            model_path: Some(paths.model_path.clone()),
            preprocessors_dir: paths.preprocessors_dir.clone(),
            ..Default::default()
        };
        fs::create_dir_all(&config.input_dir).unwrap();
        ScoringService::new(&config).unwrap()
    }

    fn output_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.join("output"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_process_file_writes_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let input = dir.path().join("input/batch_7.csv");
        fs::write(
            &input,
            format!(
                "{}\n\
                 0,2024-05-06 14:30:00,A,B,s,c,j,m,1,20,40,-74,40.5,-74.5,1000,food,NY,F,0\n\
                 1,2024-05-06 15:30:00,A,B,s,c,j,m,1,900,40,-74,40.5,-74.5,1000,travel,CA,M,1\n",
                HEADER
            ),
        )
        .unwrap();

        let run = service.process_file(&input).unwrap();
        let names = output_files(dir.path());
        assert_eq!(names.len(), 3);
        assert!(names.iter().any(|n| n.starts_with("predictions_batch_7_")));
        assert!(names.iter().any(|n| n.starts_with("top5_batch_7_")));
        assert!(names.iter().any(|n| n.starts_with("score_density_batch_7_")));

        let table = fs::read_to_string(&run.decisions).unwrap();
        assert_eq!(table, "index,prediction\n0,0\n1,1\n");
        assert_eq!(service.metrics().files_processed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_file_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let input = dir.path().join("input/broken.csv");
        fs::write(
            &input,
            "transaction_time,lat,lon,merchant_lat,merchant_lon,population_city,cat_id,us_state,gender\n\
             2024-05-06 14:30:00,40,-74,40.5,-74.5,1000,food,NY,F\n",
        )
        .unwrap();

        let err = service.process_file(&input).unwrap_err();
        let scoring = err.downcast_ref::<ScoringError>().unwrap();
        assert!(scoring.is_malformed_input());

        service.handle_input(&input);
        assert!(output_files(dir.path()).is_empty());
        assert_eq!(service.metrics().files_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_service_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        service.handle_input(&dir.path().join("input/does_not_exist.csv"));

        let input = dir.path().join("input/good.csv");
        fs::write(
            &input,
            format!(
                "{}\n0,2024-05-06 14:30:00,A,B,s,c,j,m,1,20,40,-74,40.5,-74.5,1000,food,NY,F,\n",
                HEADER
            ),
        )
        .unwrap();
        service.handle_input(&input);

        assert_eq!(service.metrics().files_failed.load(Ordering::Relaxed), 1);
        assert_eq!(service.metrics().files_processed.load(Ordering::Relaxed), 1);
        assert_eq!(output_files(dir.path()).len(), 3);
    }

    #[test]
    fn test_reload_artifacts_between_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path());
        assert_eq!(service.pipeline().top_influential_features(1).names(), vec!["amount"]);

        let artifacts = toy_artifacts();
        let names = artifacts.output_names();
        let mut weights = vec![0.0; names.len()];
        weights[8] = 3.0;
        let classifier = LogisticClassifier::new(names, weights, 0.0).unwrap();
        let paths = write_artifacts(dir.path(), &artifacts, &classifier);

        service.reload_artifacts().unwrap();
        assert_eq!(
            service.pipeline().top_influential_features(1).names(),
            vec!["distance_km"]
        );

        fs::remove_file(&paths.model_path).unwrap();
        let err = service.reload_artifacts().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoringError>(),
            Some(ScoringError::ArtifactLoad { .. })
        ));
        assert_eq!(
            service.pipeline().top_influential_features(1).names(),
            vec!["distance_km"]
        );
    }
}
