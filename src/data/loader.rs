// ============================================================
// Layer 4 — Corpus Loaders
// ============================================================
// Two on-disk formats feed the trainers:
//
//   1. Plain text (language model)
//        one sentence or paragraph per line, e.g. PTB:
//          "the company said it expects to report ..."
//
//   2. Tab-separated NLI triples (entailment)
//        label<TAB>premise<TAB>hypothesis
//          "neutral	A dog runs.	A dog runs to its owner."
//
// Rows with an unknown label (SNLI marks "no consensus" as "-")
// or the wrong number of columns are skipped with a warning
// instead of failing the whole load. A header row such as
// "gold_label<TAB>sentence1<TAB>sentence2" is skipped the same way.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::data::preprocessor::Preprocessor;
use crate::domain::example::{Label, NliPair};
use crate::domain::traits::ExampleSource;

// ─── TextCorpusLoader ─────────────────────────────────────────────────────────
/// Loads a plain text corpus as cleaned, lowercased, non-empty lines.
pub struct TextCorpusLoader {
    path: PathBuf,
}

impl TextCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExampleSource for TextCorpusLoader {
    type Example = String;

    fn load_all(&self) -> Result<Vec<String>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        let lines = Preprocessor::lowercasing().clean_lines(&text);
        tracing::debug!("Loaded {} lines from '{}'", lines.len(), self.path.display());
        Ok(lines)
    }
}

// ─── NliTsvLoader ─────────────────────────────────────────────────────────────
/// Loads `label<TAB>premise<TAB>hypothesis` rows.
pub struct NliTsvLoader {
    path: PathBuf,
}

impl NliTsvLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExampleSource for NliTsvLoader {
    type Example = NliPair;

    fn load_all(&self) -> Result<Vec<NliPair>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read NLI file '{}'", self.path.display()))?;

        let cleaner     = Preprocessor::lowercasing();
        let mut pairs   = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(line, &cleaner) {
                Some(pair) => pairs.push(pair),
                None => {
                    skipped += 1;
                    tracing::debug!("Skipping '{}' line {}", self.path.display(), line_no + 1);
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} malformed or unlabelled rows in '{}'",
                skipped,
                self.path.display()
            );
        }
        tracing::info!("Loaded {} NLI pairs from '{}'", pairs.len(), self.path.display());
        Ok(pairs)
    }
}

/// Parse one TSV row. Returns None for rows that should be skipped.
fn parse_row(line: &str, cleaner: &Preprocessor) -> Option<NliPair> {
    let mut cols = line.split('\t');
    let label      = Label::parse(cols.next()?)?;
    let premise    = cleaner.clean_line(cols.next()?);
    let hypothesis = cleaner.clean_line(cols.next()?);

    if cols.next().is_some() {
        return None;
    }
    Some(NliPair::new(premise, hypothesis, label))
}
