// ============================================================
// Layer 5 — Test-Set Predictor
// ============================================================
// Runs a trained entailment model over the test set in corpus
// order, 10 examples per batch, and returns one predicted label
// index per example plus the test accuracy.
//
// The model is used on whatever backend it lives on. Callers
// pass model.valid() so no autodiff graph is built.

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::{
    batcher::{int_values, NliBatch, NliBatcher},
    dataset::NliExample,
};
use crate::ml::loss::predictions;

const PREDICT_BATCH_SIZE: usize = 10;

/// Anything that maps an entailment batch to label log-probabilities.
pub trait Classify<B: Backend> {
    /// [batch, classes]
    fn log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestPredictions {
    /// Predicted label index per test example, in input order
    pub labels:   Vec<usize>,
    /// Percentage in [0, 100]; 0 for an empty test set
    pub accuracy: f64,
}

pub fn predict<B: Backend, M: Classify<B>>(
    model:    &M,
    examples: &[NliExample],
    device:   &B::Device,
) -> Result<TestPredictions> {
    let batcher     = NliBatcher::<B>::new(device.clone());
    let mut labels  = Vec::with_capacity(examples.len());
    let mut correct = 0usize;

    for chunk in examples.chunks(PREDICT_BATCH_SIZE) {
        let batch = batcher.batch(chunk.to_vec());
        let preds = int_values(predictions(model.log_probs(&batch)))?;

        for (pred, example) in preds.iter().zip(chunk) {
            let pred = (*pred).max(0) as usize;
            if pred == example.label {
                correct += 1;
            }
            labels.push(pred);
        }
    }

    let accuracy = if labels.is_empty() {
        0.0
    } else {
        100.0 * correct as f64 / labels.len() as f64
    };
    tracing::info!("Test Acc: {:.6}%", accuracy);

    Ok(TestPredictions { labels, accuracy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::float_tensor;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    /// Predicts label = first premise id mod 3
    struct FirstTokenClassifier;

    impl<B: Backend> Classify<B> for FirstTokenClassifier {
        fn log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
            let n = batch.len();
            let firsts: Vec<i64> = batch
                .premise
                .clone()
                .slice([0..n, 0..1])
                .into_data()
                .convert::<i64>()
                .to_vec()
                .unwrap();
            let scores = firsts
                .iter()
                .flat_map(|&t| (0..3).map(move |c| if c == t % 3 { 0.0 } else { -5.0 }))
                .collect();
            float_tensor(scores, [n, 3], &batch.premise.device())
        }
    }

    fn example(first: u32, label: usize) -> NliExample {
        NliExample { premise: vec![first, 9], hypothesis: vec![4], label }
    }

    #[test]
    fn test_predictions_keep_input_order_across_batches() {
        // 23 examples → batches of 10, 10 and 3
        let examples: Vec<NliExample> = (0..23).map(|i| example(i, (i % 3) as usize)).collect();
        let out = predict::<TestBackend, _>(&FirstTokenClassifier, &examples, &Default::default()).unwrap();

        let expected: Vec<usize> = (0..23).map(|i| i % 3).collect();
        assert_eq!(out.labels, expected);
        assert_eq!(out.accuracy, 100.0);
    }

    #[test]
    fn test_accuracy_counts_mismatches() {
        let examples = vec![example(0, 0), example(1, 0), example(2, 2), example(3, 1)];
        let out = predict::<TestBackend, _>(&FirstTokenClassifier, &examples, &Default::default()).unwrap();
        assert_eq!(out.labels, vec![0, 1, 2, 0]);
        assert_eq!(out.accuracy, 50.0);
    }

    #[test]
    fn test_empty_test_set() {
        let out = predict::<TestBackend, _>(&FirstTokenClassifier, &[], &Default::default()).unwrap();
        assert!(out.labels.is_empty());
        assert_eq!(out.accuracy, 0.0);
    }
}
