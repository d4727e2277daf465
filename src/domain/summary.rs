// ============================================================
// Layer 3 — Validation Summary and Training Bookkeeping
// ============================================================
// Scalar bookkeeping shared by both trainers:
//
//   EvalTotals        — summed loss / correct / count over a pass
//   ValidationSummary — normalised (loss, accuracy, perplexity)
//   RunningWindow     — training counters reset every log_freq batches
//   BestTracker       — remembers the best validation accuracy
//
// Perplexity is exp(average per-token negative log-likelihood).
// Since NLL is never negative, perplexity is never below 1.
//
// Reference: Jurafsky & Martin, "Speech and Language Processing" §3.2.1

use serde::{Deserialize, Serialize};

// ─── EvalTotals ───────────────────────────────────────────────────────────────
/// Raw sums collected over a validation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalTotals {
    /// Sum of per-item negative log-likelihoods
    pub loss_sum: f64,
    /// Number of items whose argmax matched the target
    pub correct:  usize,
    /// Number of items (tokens for language models, examples for NLI)
    pub count:    usize,
}

impl EvalTotals {
    pub fn add(&mut self, loss_sum: f64, correct: usize, count: usize) {
        self.loss_sum += loss_sum;
        self.correct  += correct;
        self.count    += count;
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary::from_totals(self.loss_sum, self.correct, self.count)
    }
}

// ─── ValidationSummary ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Average negative log-likelihood per item
    pub loss:       f64,
    /// Percentage of correct predictions, always within [0, 100]
    pub accuracy:   f64,
    /// exp(loss), always >= 1
    pub perplexity: f64,
}

impl ValidationSummary {
    /// Normalise raw sums. An empty pass reports zero loss, zero
    /// accuracy and perplexity 1 instead of dividing by zero.
    pub fn from_totals(loss_sum: f64, correct: usize, count: usize) -> Self {
        if count == 0 {
            return Self { loss: 0.0, accuracy: 0.0, perplexity: 1.0 };
        }
        let loss     = (loss_sum / count as f64).max(0.0);
        let accuracy = 100.0 * correct.min(count) as f64 / count as f64;
        Self { loss, accuracy, perplexity: loss.exp() }
    }
}

// ─── RunningWindow ────────────────────────────────────────────────────────────
/// Counters for the periodic training log line.
/// `take()` returns the averages and resets the window.
#[derive(Debug, Clone, Default)]
pub struct RunningWindow {
    loss_sum: f64,
    batches:  usize,
    correct:  usize,
    count:    usize,
    tracks_accuracy: bool,
}

/// Averages over one logging window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    /// Mean reported loss per batch in the window
    pub loss:     f64,
    /// Fraction of correct training predictions, if the step reports them
    pub accuracy: Option<f64>,
    pub batches:  usize,
}

impl RunningWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch. `correct` is None for steps that do not
    /// produce predictions (the VAE reports only its ELBO).
    pub fn record(&mut self, reported_loss: f64, correct: Option<usize>, count: usize) {
        self.loss_sum += reported_loss;
        self.batches  += 1;
        if let Some(c) = correct {
            self.tracks_accuracy = true;
            self.correct += c;
            self.count   += count;
        }
    }

    pub fn take(&mut self) -> WindowStats {
        let loss = if self.batches > 0 { self.loss_sum / self.batches as f64 } else { 0.0 };
        let accuracy = match (self.tracks_accuracy, self.count) {
            (false, _) => None,
            (true, 0)  => Some(0.0),
            (true, n)  => Some(self.correct as f64 / n as f64),
        };
        let stats = WindowStats { loss, accuracy, batches: self.batches };
        *self = Self::default();
        stats
    }
}

// ─── BestTracker ──────────────────────────────────────────────────────────────
/// Tracks the best validation accuracy seen so far.
/// Only a strictly higher accuracy counts as an improvement,
/// so ties keep the earlier snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestTracker {
    best:  ValidationSummary,
    epoch: usize,
}

impl BestTracker {
    /// Start from the summary of the untrained (or freshly loaded) model.
    /// Epoch 0 means "before any training".
    pub fn new(initial: ValidationSummary) -> Self {
        Self { best: initial, epoch: 0 }
    }

    /// Returns true and records the summary if it beats the best accuracy.
    pub fn observe(&mut self, epoch: usize, summary: ValidationSummary) -> bool {
        if summary.accuracy > self.best.accuracy {
            self.best  = summary;
            self.epoch = epoch;
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> ValidationSummary {
        self.best
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perplexity_is_exp_of_average_loss() {
        let s = ValidationSummary::from_totals(46.0, 10, 20);
        assert!((s.loss - 2.3).abs() < 1e-12);
        assert!((s.perplexity - 2.3f64.exp()).abs() < 1e-9);
    }

    #[test]
    fn test_perplexity_never_below_one() {
        for (loss_sum, count) in [(0.0, 5), (1e-9, 3), (100.0, 1), (0.0, 0)] {
            let s = ValidationSummary::from_totals(loss_sum, 0, count);
            assert!(s.perplexity >= 1.0, "ppl {} for {loss_sum}/{count}", s.perplexity);
        }
    }

    #[test]
    fn test_accuracy_bounds() {
        assert_eq!(ValidationSummary::from_totals(1.0, 7, 7).accuracy, 100.0);
        assert_eq!(ValidationSummary::from_totals(1.0, 0, 7).accuracy, 0.0);
        assert_eq!(ValidationSummary::from_totals(1.0, 3, 4).accuracy, 75.0);
    }

    #[test]
    fn test_empty_pass() {
        let s = EvalTotals::default().summary();
        assert_eq!(s, ValidationSummary { loss: 0.0, accuracy: 0.0, perplexity: 1.0 });
    }

    #[test]
    fn test_totals_accumulate() {
        let mut t = EvalTotals::default();
        t.add(3.0, 2, 4);
        t.add(1.0, 1, 4);
        assert_eq!(t, EvalTotals { loss_sum: 4.0, correct: 3, count: 8 });
        assert_eq!(t.summary().accuracy, 37.5);
    }

    #[test]
    fn test_window_averages_and_resets() {
        let mut w = RunningWindow::new();
        w.record(2.0, Some(3), 4);
        w.record(4.0, Some(1), 4);
        let stats = w.take();
        assert_eq!(stats.loss, 3.0);
        assert_eq!(stats.accuracy, Some(0.5));
        assert_eq!(stats.batches, 2);
        // take() resets the window
        let empty = w.take();
        assert_eq!(empty.batches, 0);
        assert_eq!(empty.loss, 0.0);
    }

    #[test]
    fn test_window_without_accuracy() {
        let mut w = RunningWindow::new();
        w.record(-1.5, None, 8);
        assert_eq!(w.take().accuracy, None);
    }

    #[test]
    fn test_best_tracker_requires_strict_improvement() {
        let base = ValidationSummary::from_totals(5.0, 5, 10);
        let mut best = BestTracker::new(base);

        assert!(!best.observe(1, ValidationSummary::from_totals(1.0, 5, 10)));
        assert_eq!(best.epoch(), 0);

        assert!(best.observe(2, ValidationSummary::from_totals(4.0, 6, 10)));
        assert_eq!(best.epoch(), 2);
        assert_eq!(best.best().accuracy, 60.0);

        assert!(!best.observe(3, ValidationSummary::from_totals(9.0, 4, 10)));
        assert_eq!(best.epoch(), 2);
    }
}
