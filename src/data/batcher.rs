// ============================================================
// Layer 4 — Batchers
// ============================================================
// Implements Burn's Batcher trait for both pipelines.
//
// Language model:
//   Input:  N LmWindows, each with seq_len input and target ids
//   Output: inputs  [N, seq_len]
//           targets [N * seq_len]   (flattened to match the
//                                    model's [N * seq_len, vocab]
//                                    log-probabilities)
//
// Entailment:
//   Input:  N NliExamples with sentences of varying length
//   Output: premise / hypothesis ids [N, longest] right-padded
//           with the [PAD] id 0, float masks of the same shape
//           (1.0 = real token, 0.0 = padding), labels [N]
//
// Sentences are padded per batch rather than to a global
// maximum, so short batches stay cheap. An empty sentence
// still occupies one (masked) position.
//
// Reference: Burn Book §4 (Batcher)

use anyhow::{anyhow, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::{dataset::NliExample, windows::LmWindow};

/// Id used for padding positions
pub const PAD_ID: u32 = 0;

// ─── Tensor helpers ───────────────────────────────────────────────────────────
/// Build an Int tensor of the given shape from row-major values.
pub fn int_tensor<B: Backend, const D: usize>(
    values: Vec<i64>,
    shape:  [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let data = TensorData::new(values, shape).convert::<B::IntElem>();
    Tensor::from_data(data, device)
}

/// Build a Float tensor of the given shape from row-major values.
pub fn float_tensor<B: Backend, const D: usize>(
    values: Vec<f32>,
    shape:  [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    let data = TensorData::new(values, shape).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

/// Read a Float tensor back as row-major f32 values.
pub fn float_values<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read float tensor values: {e:?}"))
}

/// Read an Int tensor back as row-major i64 values.
pub fn int_values<B: Backend, const D: usize>(t: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    t.into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read int tensor values: {e:?}"))
}

// ─── Language model ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct LmBatch<B: Backend> {
    /// Context token ids: [batch_size, seq_len]
    pub inputs: Tensor<B, 2, Int>,

    /// Next-token ids: [batch_size * seq_len]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct LmBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> LmBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LmWindow, LmBatch<B>> for LmBatcher<B> {
    fn batch(&self, items: Vec<LmWindow>) -> LmBatch<B> {
        let batch_size = items.len();
        // Every window has the same length (see BpttWindower)
        let seq_len    = items.first().map(|w| w.input.len()).unwrap_or(0);

        let inputs: Vec<i64> = items
            .iter()
            .flat_map(|w| w.input.iter().map(|&t| t as i64))
            .collect();
        let targets: Vec<i64> = items
            .iter()
            .flat_map(|w| w.target.iter().map(|&t| t as i64))
            .collect();

        LmBatch {
            inputs:  int_tensor(inputs, [batch_size, seq_len], &self.device),
            targets: int_tensor(targets, [batch_size * seq_len], &self.device),
        }
    }
}

// ─── Entailment ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct NliBatch<B: Backend> {
    /// Premise ids: [batch_size, premise_len]
    pub premise: Tensor<B, 2, Int>,
    /// 1.0 for real premise tokens, 0.0 for padding
    pub premise_mask: Tensor<B, 2>,
    /// Hypothesis ids: [batch_size, hypothesis_len]
    pub hypothesis: Tensor<B, 2, Int>,
    pub hypothesis_mask: Tensor<B, 2>,
    /// Gold class indices: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> NliBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct NliBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> NliBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

/// Pad a list of sequences to a common length (at least 1).
/// Returns flattened ids, flattened mask and the padded length.
fn pad_sequences<'a>(seqs: impl Iterator<Item = &'a [u32]> + Clone) -> (Vec<i64>, Vec<f32>, usize) {
    let max_len = seqs.clone().map(|s| s.len()).max().unwrap_or(0).max(1);

    let mut ids  = Vec::new();
    let mut mask = Vec::new();
    for seq in seqs {
        for pos in 0..max_len {
            match seq.get(pos) {
                Some(&t) => { ids.push(t as i64);      mask.push(1.0); }
                None     => { ids.push(PAD_ID as i64); mask.push(0.0); }
            }
        }
    }
    (ids, mask, max_len)
}

impl<B: Backend> Batcher<NliExample, NliBatch<B>> for NliBatcher<B> {
    fn batch(&self, items: Vec<NliExample>) -> NliBatch<B> {
        let batch_size = items.len();

        let (p_ids, p_mask, p_len) = pad_sequences(items.iter().map(|e| e.premise.as_slice()));
        let (h_ids, h_mask, h_len) = pad_sequences(items.iter().map(|e| e.hypothesis.as_slice()));
        let labels: Vec<i64>       = items.iter().map(|e| e.label as i64).collect();

        NliBatch {
            premise:         int_tensor(p_ids, [batch_size, p_len], &self.device),
            premise_mask:    float_tensor(p_mask, [batch_size, p_len], &self.device),
            hypothesis:      int_tensor(h_ids, [batch_size, h_len], &self.device),
            hypothesis_mask: float_tensor(h_mask, [batch_size, h_len], &self.device),
            labels:          int_tensor(labels, [batch_size], &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_pad_sequences_masks_padding() {
        let a: &[u32] = &[5, 6, 7];
        let b: &[u32] = &[8];
        let (ids, mask, len) = pad_sequences([a, b].into_iter());
        assert_eq!(len, 3);
        assert_eq!(ids, vec![5, 6, 7, 8, 0, 0]);
        assert_eq!(mask, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tensor_values_read_back_row_major() {
        let device = Default::default();
        let floats = float_tensor::<TestBackend, 2>(vec![0.5, 1.5, 2.5, 3.5], [2, 2], &device);
        let ints   = int_tensor::<TestBackend, 1>(vec![4, 0, 7], [3], &device);
        assert_eq!(float_values(floats).unwrap(), vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(int_values(ints).unwrap(), vec![4, 0, 7]);
    }

    #[test]
    fn test_empty_sentences_get_one_position() {
        let a: &[u32] = &[];
        let (ids, mask, len) = pad_sequences([a].into_iter());
        assert_eq!(len, 1);
        assert_eq!(ids, vec![0]);
        assert_eq!(mask, vec![0.0]);
    }

    #[test]
    fn test_nli_batch_shapes() {
        let batcher = NliBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            NliExample { premise: vec![3, 4, 5, 6], hypothesis: vec![7],    label: 2 },
            NliExample { premise: vec![3],          hypothesis: vec![8, 9], label: 0 },
        ]);
        assert_eq!(batch.premise.dims(), [2, 4]);
        assert_eq!(batch.hypothesis_mask.dims(), [2, 2]);
        assert_eq!(batch.len(), 2);

        let mask: f32 = batch.premise_mask.sum().into_scalar().elem();
        assert_eq!(mask, 5.0);
    }

    #[test]
    fn test_lm_batch_flattens_targets() {
        let batcher = LmBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            LmWindow { input: vec![1, 2, 3], target: vec![2, 3, 4] },
            LmWindow { input: vec![4, 5, 6], target: vec![5, 6, 7] },
        ]);
        assert_eq!(batch.inputs.dims(), [2, 3]);
        assert_eq!(batch.targets.dims(), [6]);

        let total: i64 = batch.targets.sum().into_scalar().elem();
        assert_eq!(total, 2 + 3 + 4 + 5 + 6 + 7);
    }
}
