// ============================================================
// Layer 5 — Negative Log-Likelihood
// ============================================================
// Every model in this crate ends in log_softmax, so the loss
// is a gather of the gold log-probability:
//
//   nll_i = -log p(y_i | x_i) = -log_probs[i, y_i]
//
// Training uses the mean over items, validation the sum (so
// totals can be divided by the true item count afterwards).

use burn::prelude::*;

/// Per-item NLL. log_probs: [n, classes], targets: [n] → [n]
pub fn nll_per_item<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [n, _] = log_probs.dims();
    log_probs
        .gather(1, targets.reshape([n, 1]))
        .reshape([n])
        .neg()
}

pub fn nll_mean<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    nll_per_item(log_probs, targets).mean()
}

pub fn nll_sum<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    nll_per_item(log_probs, targets).sum()
}

/// argmax predictions: [n]
pub fn predictions<B: Backend>(log_probs: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [n, _] = log_probs.dims();
    log_probs.argmax(1).reshape([n])
}

/// Number of rows whose argmax equals the target
pub fn count_correct<B: Backend>(log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let hits: i64 = predictions(log_probs)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    hits.max(0) as usize
}

/// Read a single-element tensor as f64
pub fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{float_tensor, int_tensor};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn log_probs() -> Tensor<TestBackend, 2> {
        let device = Default::default();
        let probs  = vec![0.5f32, 0.25, 0.25, 0.1, 0.8, 0.1];
        float_tensor::<TestBackend, 2>(probs, [2, 3], &device).log()
    }

    #[test]
    fn test_nll_gathers_gold_log_prob() {
        let targets = int_tensor::<TestBackend, 1>(vec![0, 2], [2], &Default::default());
        let sum     = scalar(nll_sum(log_probs(), targets.clone()));
        let mean    = scalar(nll_mean(log_probs(), targets));
        let expected = -(0.5f64.ln() + 0.1f64.ln());
        assert!((sum - expected).abs() < 1e-5);
        assert!((mean - expected / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_count_correct() {
        let device  = Default::default();
        let targets = int_tensor::<TestBackend, 1>(vec![0, 2], [2], &device);
        assert_eq!(count_correct(log_probs(), targets), 1);

        let targets = int_tensor::<TestBackend, 1>(vec![0, 1], [2], &device);
        assert_eq!(count_correct(log_probs(), targets), 2);
    }
}
