// ============================================================
// Layer 5 — Train / Eval Step Contracts
// ============================================================
// The generic training loop in trainer.rs never looks inside a
// model. Each model family implements two small traits:
//
//   TrainStep<B, Batch>  on the autodiff model
//       forward + scalar loss for one batch; the loop does
//       backward, clipping and the optimizer step
//
//   EvalStep<B, Batch>   on the inner (no-autodiff) model
//       summed loss, correct count and item count for one
//       validation batch, plus optional extras
//
// This mirrors the TrainStep / ValidStep split of burn-train
// without pulling in its Learner.

use anyhow::Result;
use burn::{prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::{posterior::PosteriorTable, traits::AttentionSample};
use crate::ml::loss::{count_correct, nll_mean, nll_sum, scalar};

/// Result of one training step
pub struct StepOutput<B: Backend> {
    /// Scalar to differentiate
    pub loss: Tensor<B, 1>,
    /// Value shown in the training log (the loss itself, or -ELBO)
    pub reported_loss: f64,
    /// Correct training predictions, if the step produces predictions
    pub correct: Option<usize>,
    /// Items in the batch (tokens or examples)
    pub count: usize,
}

/// Result of one validation step
#[derive(Debug, Clone, Default)]
pub struct EvalOutput {
    pub loss_sum: f64,
    pub correct:  usize,
    pub count:    usize,
    /// q(z | x, y) summed per gold label (VAE only)
    pub posterior: Option<PosteriorTable>,
    /// First example's attention matrix, when requested and available
    pub attention: Option<AttentionSample>,
}

pub trait TrainStep<B: AutodiffBackend, T> {
    fn train_step(&self, batch: T) -> StepOutput<B>;
}

pub trait EvalStep<B: Backend, T> {
    /// `capture_attention` asks the model to fill `EvalOutput::attention`.
    /// Fails when tensor values cannot be read back from the device.
    fn eval_step(&self, batch: T, capture_attention: bool) -> Result<EvalOutput>;
}

// ─── Shared classification steps ──────────────────────────────────────────────
// Every model except the VAE trains on plain NLL over [n, classes]
// log-probabilities, so they share these two helpers.

/// Mean NLL to differentiate, plus detached accuracy counters.
pub fn classification_step<B: AutodiffBackend>(
    log_probs: Tensor<B, 2>,
    targets:   Tensor<B, 1, Int>,
) -> StepOutput<B> {
    let count   = targets.dims()[0];
    let correct = count_correct(log_probs.clone().detach(), targets.clone());
    let loss    = nll_mean(log_probs, targets);
    StepOutput {
        reported_loss: scalar(loss.clone().detach()),
        loss,
        correct: Some(correct),
        count,
    }
}

/// Summed NLL, correct count and item count for one validation batch.
pub fn classification_eval<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> EvalOutput {
    EvalOutput {
        count:    targets.dims()[0],
        correct:  count_correct(log_probs.clone(), targets.clone()),
        loss_sum: scalar(nll_sum(log_probs, targets)),
        ..Default::default()
    }
}
