// ============================================================
// Layer 3 — Core Traits
// ============================================================
// The application layer asks for "all the examples" without
// caring whether they come from a plain text corpus or a
// tab-separated entailment file.

use anyhow::Result;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can load raw examples from a source.
///
/// Implementations:
///   - TextCorpusLoader → one cleaned line of text per example
///   - NliTsvLoader     → one labelled premise/hypothesis pair per example
pub trait ExampleSource {
    /// The raw example type produced by this source
    type Example;

    /// Load every example available from this source.
    fn load_all(&self) -> Result<Vec<Self::Example>>;
}

// ─── AttentionSink ────────────────────────────────────────────────────────────
/// One example's attention matrix, captured during validation.
/// `weights[i][j]` is the weight between hypothesis word i and
/// premise word j. Padding positions are already removed.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionSample {
    pub premise:    Vec<u32>,
    pub hypothesis: Vec<u32>,
    pub weights:    Vec<Vec<f32>>,
}

/// Receives attention samples for inspection.
///
/// Implementations:
///   - AttentionCsvSink → writes the matrix with word labels to a CSV file
pub trait AttentionSink {
    fn record(&mut self, sample: &AttentionSample) -> Result<()>;
}
