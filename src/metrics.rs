//! Score distribution summaries and service counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Default number of histogram buckets over [0, 1].
pub const DEFAULT_HISTOGRAM_BINS: usize = 50;

/// Descriptive summary of one batch's score column.
///
/// Carries a normalized histogram over [0, 1] (density integrates to 1),
/// which is all a renderer needs to draw the score density plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    /// Bucket boundaries, `bins + 1` values from 0.0 to 1.0
    pub edges: Vec<f64>,
    /// Scores per bucket; the last bucket includes 1.0
    pub counts: Vec<u64>,
    /// `counts / (count * bucket_width)`
    pub density: Vec<f64>,
}

impl ScoreDistribution {
    pub fn from_scores(scores: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let width = 1.0 / bins as f64;
        let edges: Vec<f64> = (0..=bins).map(|i| i as f64 * width).collect();

        let mut counts = vec![0u64; bins];
        for &score in scores {
            debug_assert!(score.is_finite(), "non-finite score {}", score);
            let bucket = ((score.clamp(0.0, 1.0) * bins as f64) as usize).min(bins - 1);
            counts[bucket] += 1;
        }

        let count = scores.len();
        let density = counts
            .iter()
            .map(|&c| {
                if count == 0 {
                    0.0
                } else {
                    c as f64 / (count as f64 * width)
                }
            })
            .collect();

        if count == 0 {
            return Self {
                count,
                min: None,
                max: None,
                mean: None,
                std: None,
                p50: None,
                p95: None,
                p99: None,
                edges,
                counts,
                density,
            };
        }

        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        Self {
            count,
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            mean: Some(mean),
            std: Some(variance.sqrt()),
            p50: Some(percentile(0.50)),
            p95: Some(percentile(0.95)),
            p99: Some(percentile(0.99)),
            edges,
            counts,
            density,
        }
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }
}

/// Counters for the lifetime of the service.
pub struct ServiceMetrics {
    pub files_processed: AtomicU64,
    pub files_failed: AtomicU64,
    pub rows_scored: AtomicU64,
    pub positives: AtomicU64,
    /// Total processing time of successful files, in microseconds
    processing_us: AtomicU64,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            files_processed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            positives: AtomicU64::new(0),
            processing_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored file.
    pub fn record_file(&self, rows: usize, positives: usize, elapsed: Duration) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
        self.positives.fetch_add(positives as u64, Ordering::Relaxed);
        self.processing_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of scored rows labelled positive, in percent.
    pub fn positive_rate(&self) -> f64 {
        let rows = self.rows_scored.load(Ordering::Relaxed);
        if rows == 0 {
            return 0.0;
        }
        self.positives.load(Ordering::Relaxed) as f64 / rows as f64 * 100.0
    }

    /// Mean processing time per successful file.
    pub fn mean_file_time(&self) -> Duration {
        let files = self.files_processed.load(Ordering::Relaxed);
        if files == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.processing_us.load(Ordering::Relaxed) / files)
    }

    pub fn log_summary(&self) {
        info!(
            uptime_s = self.start_time.elapsed().as_secs(),
            files_processed = self.files_processed.load(Ordering::Relaxed),
            files_failed = self.files_failed.load(Ordering::Relaxed),
            rows_scored = self.rows_scored.load(Ordering::Relaxed),
            positive_rate = format!("{:.2}%", self.positive_rate()),
            mean_file_ms = self.mean_file_time().as_millis() as u64,
            "Scoring service summary"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
