// ============================================================
// Layer 6 — Prediction and Attention Export
// ============================================================
// Files written after (or during) an entailment run:
//
//   predictions{suffix}.txt     Id,Category
//                               0,2
//                               1,0
//                               ...
//   test_results{suffix}.text   Test Acc: 84.210000%
//
//   img/{save_img}.csv          attention matrix of one
//                               validation example; first row
//                               holds the premise words, each
//                               following row starts with a
//                               hypothesis word

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::traits::{AttentionSample, AttentionSink};
use crate::infra::vocab_store::Vocabulary;

// ─── Predictions ──────────────────────────────────────────────────────────────
pub struct PredictionWriter {
    dir:    PathBuf,
    suffix: String,
}

impl PredictionWriter {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self { dir: dir.into(), suffix: suffix.into() }
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.dir.join(format!("predictions{}.txt", self.suffix))
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(format!("test_results{}.text", self.suffix))
    }

    /// Write one row per prediction plus the accuracy summary file.
    pub fn write(&self, predictions: &[usize], accuracy: f64) -> Result<()> {
        let path = self.predictions_path();
        let file = fs::File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        let mut out = BufWriter::new(file);

        writeln!(out, "Id,Category")?;
        for (row, pred) in predictions.iter().enumerate() {
            writeln!(out, "{row},{pred}")?;
        }
        out.flush()?;

        fs::write(self.results_path(), format!("Test Acc: {accuracy:.6}%"))
            .with_context(|| format!("Cannot write '{}'", self.results_path().display()))?;

        tracing::info!(
            "Wrote {} predictions to '{}'",
            predictions.len(),
            path.display()
        );
        Ok(())
    }
}

// ─── Attention CSV ────────────────────────────────────────────────────────────
pub struct AttentionCsvSink<'a> {
    path:  PathBuf,
    vocab: &'a Vocabulary,
}

impl<'a> AttentionCsvSink<'a> {
    /// Creates the parent directory of `path` if needed.
    pub fn new(path: impl AsRef<Path>, vocab: &'a Vocabulary) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path, vocab })
    }
}

impl AttentionSink for AttentionCsvSink<'_> {
    fn record(&mut self, sample: &AttentionSample) -> Result<()> {
        let words = |ids: &[u32]| -> Vec<String> { ids.iter().map(|&id| self.vocab.token(id)).collect() };
        let premise    = words(&sample.premise);
        let hypothesis = words(&sample.hypothesis);
        tracing::debug!("premise:    {:?}", premise);
        tracing::debug!("hypothesis: {:?}", hypothesis);

        write_attention_csv(&self.path, &premise, &hypothesis, &sample.weights)?;
        tracing::debug!("Attention matrix saved to '{}'", self.path.display());
        Ok(())
    }
}

fn csv_field(word: &str) -> String {
    if word.contains([',', '"', '\n']) {
        format!("\"{}\"", word.replace('"', "\"\""))
    } else {
        word.to_string()
    }
}

fn write_attention_csv(
    path:       &Path,
    premise:    &[String],
    hypothesis: &[String],
    weights:    &[Vec<f32>],
) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    let header: Vec<String> = premise.iter().map(|w| csv_field(w)).collect();
    writeln!(out, ",{}", header.join(","))?;

    for (word, row) in hypothesis.iter().zip(weights) {
        let cells: Vec<String> = row.iter().map(|w| format!("{w:.4}")).collect();
        writeln!(out, "{},{}", csv_field(word), cells.join(","))?;
    }
    out.flush()?;
    Ok(())
}
