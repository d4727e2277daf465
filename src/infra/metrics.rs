// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per completed epoch so learning curves
// can be plotted after the run.
//
// Output file: <checkpoint dir>/metrics.csv
//
//   epoch,train_loss,val_loss,val_acc,val_ppl
//   1,1.081200,1.052300,43.120000,2.864320
//   2,0.974100,0.990100,51.870000,2.691470
//
// train_loss is the mean reported loss over all training
// batches of the epoch (the negated ELBO for the VAE).
// Rows are appended, so resumed runs extend the same file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::summary::ValidationSummary;

const HEADER: &str = "epoch,train_loss,val_loss,val_acc,val_ppl";

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    /// Percentage in [0, 100]
    pub val_acc:    f64,
    pub val_ppl:    f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val: &ValidationSummary) -> Self {
        Self {
            epoch,
            train_loss,
            val_loss: val.loss,
            val_acc:  val.accuracy,
            val_ppl:  val.perplexity,
        }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.train_loss, m.val_loss, m.val_acc, m.val_ppl,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let val = ValidationSummary::from_totals(1.0, 1, 2);

        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.75, &val)).unwrap();

        // A second logger over the same directory must not repeat the header
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log(&EpochMetrics::new(2, 0.5, &val)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].starts_with("1,0.750000,0.500000,50.000000,"));
        assert!(lines[2].starts_with("2,0.500000,"));
    }
}
