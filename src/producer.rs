//! Output artifact writer.
//!
//! Every artifact is written to a temporary file in the output directory
//! and renamed into place, so readers never observe a partial file.

use crate::error::{Result, ScoringError};
use crate::metrics::ScoreDistribution;
use crate::types::decision::{Decision, ImportanceRanking};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Timestamp format appended to every output name.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths of the three artifacts produced for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub decisions: PathBuf,
    pub importances: PathBuf,
    pub distribution: PathBuf,
}

impl RunArtifacts {
    pub fn all(&self) -> [&Path; 3] {
        [
            self.decisions.as_path(),
            self.importances.as_path(),
            self.distribution.as_path(),
        ]
    }
}

/// Writes scoring results to the output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Output names for a source file stem and run timestamp.
    pub fn run_paths(&self, stem: &str, timestamp: &str) -> RunArtifacts {
        RunArtifacts {
            decisions: self
                .output_dir
                .join(format!("predictions_{}_{}.csv", stem, timestamp)),
            importances: self
                .output_dir
                .join(format!("top5_{}_{}.json", stem, timestamp)),
            distribution: self
                .output_dir
                .join(format!("score_density_{}_{}.json", stem, timestamp)),
        }
    }

    /// Decision table with `index,prediction` columns.
    pub fn write_decisions(&self, path: &Path, submission: &[Decision]) -> Result<()> {
        write_atomic(path, |out| {
            let mut wtr = csv::Writer::from_writer(out);
            for decision in submission {
                wtr.serialize(decision)?;
            }
            wtr.flush()
        })
    }

    /// Importance ranking as an ordered JSON object.
    pub fn write_importances(&self, path: &Path, ranking: &ImportanceRanking) -> Result<()> {
        write_atomic(path, |out| {
            serde_json::to_writer_pretty(&mut *out, ranking)?;
            out.write_all(b"\n")
        })
    }

    /// Score distribution summary as JSON.
    pub fn write_distribution(&self, path: &Path, distribution: &ScoreDistribution) -> Result<()> {
        write_atomic(path, |out| {
            serde_json::to_writer_pretty(&mut *out, distribution)?;
            out.write_all(b"\n")
        })
    }

    /// Write all three artifacts for one run. If any write fails the ones
    /// already written are removed, leaving no output for the run.
    pub fn write_run(
        &self,
        stem: &str,
        timestamp: &str,
        submission: &[Decision],
        ranking: &ImportanceRanking,
        distribution: &ScoreDistribution,
    ) -> Result<RunArtifacts> {
        let paths = self.run_paths(stem, timestamp);
        let mut written: Vec<&Path> = Vec::with_capacity(3);

        let mut write_all = || -> Result<()> {
            self.write_decisions(&paths.decisions, submission)?;
            written.push(&paths.decisions);
            self.write_importances(&paths.importances, ranking)?;
            written.push(&paths.importances);
            self.write_distribution(&paths.distribution, distribution)
        };

        let result = write_all();

        if let Err(e) = result {
            for path in written {
                if let Err(remove_err) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %remove_err, "Failed to remove partial output");
                }
            }
            return Err(e);
        }

        Ok(paths)
    }
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let output_err = |source: io::Error| ScoringError::Output {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(output_err)?;

    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out).map_err(output_err)?;
        out.flush().map_err(output_err)?;
    }

    tmp.persist(path).map_err(|e| output_err(e.error))?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}
