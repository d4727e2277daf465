// ============================================================
// Layer 5 — Decomposable Attention Model
// ============================================================
// Sentence-pair classifier after Parikh et al. (2016):
//
//   a = project(embed(premise))         [batch, lp, hidden]
//   b = project(embed(hypothesis))      [batch, lh, hidden]
//   (optional) intra-attention: a ← merge([a, softmax(f(a)f(a)ᵀ)·a])
//
//   Attend:    e    = F(a) · F(b)ᵀ                [batch, lp, lh]
//              β    = softmax_lh(e) · b           aligned hypothesis per premise word
//              α    = softmax_lp(e)ᵀ · a          aligned premise per hypothesis word
//   Compare:   v1   = G([a, β]),  v2 = G([b, α])
//   Aggregate: v    = [Σ v1, Σ v2]                (padding excluded)
//              out  = W · H(v)  → log_softmax
//
// F, G and H are stacks of num_layers Linear + ReLU + Dropout.
//
// Padding never receives attention: masked positions get a large
// negative bias before each softmax and are zeroed before the sums.
//
// With label_conditioned = true a label embedding is appended to
// v before H. The VAE uses this variant as its inference network
// q(z | premise, hypothesis, label), with num_outputs = K.
//
// Reference: Parikh et al. (2016) A Decomposable Attention Model
//            for Natural Language Inference

use anyhow::Result;
use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{
        activation::{log_softmax, relu, softmax},
        backend::AutodiffBackend,
    },
};

use crate::data::batcher::{float_values, int_values, NliBatch};
use crate::domain::{example::Label, traits::AttentionSample};
use crate::ml::{
    predictor::Classify,
    step::{classification_eval, classification_step, EvalOutput, EvalStep, StepOutput, TrainStep},
};

/// Bias added to masked attention scores
const MASK_PENALTY: f64 = 1e9;

#[derive(Config, Debug)]
pub struct AttentionConfig {
    pub vocab_size:  usize,
    pub embed_dim:   usize,
    pub hidden_size: usize,
    #[config(default = 2)]
    pub num_layers:  usize,
    #[config(default = 0.2)]
    pub dropout:     f64,
    #[config(default = false)]
    pub intra_attn:  bool,
    /// Size of the output distribution (labels, or K for an inference network)
    #[config(default = 3)]
    pub num_outputs: usize,
    #[config(default = false)]
    pub label_conditioned: bool,
}

impl AttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionModel<B> {
        let h = self.hidden_size;

        let intra = self.intra_attn.then(|| IntraAttention {
            attend: self.mlp(h, device),
            merge:  LinearConfig::new(2 * h, h).init(device),
        });
        let label_embedding = self
            .label_conditioned
            .then(|| EmbeddingConfig::new(Label::COUNT, h).init(device));
        let aggregate_in = if self.label_conditioned { 3 * h } else { 2 * h };

        AttentionModel {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            project:   LinearConfig::new(self.embed_dim, h).init(device),
            intra,
            attend:    self.mlp(h, device),
            compare:   self.mlp(2 * h, device),
            aggregate: self.mlp(aggregate_in, device),
            label_embedding,
            output:    LinearConfig::new(h, self.num_outputs).init(device),
        }
    }

    fn mlp<B: Backend>(&self, d_input: usize, device: &B::Device) -> Mlp<B> {
        let layers = (0..self.num_layers.max(1))
            .map(|i| {
                let d_in = if i == 0 { d_input } else { self.hidden_size };
                LinearConfig::new(d_in, self.hidden_size).init(device)
            })
            .collect();
        Mlp { layers, dropout: DropoutConfig::new(self.dropout).init() }
    }
}

// ─── Building blocks ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub layers:  Vec<Linear<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> Mlp<B> {
    pub fn forward<const D: usize>(&self, mut x: Tensor<B, D>) -> Tensor<B, D> {
        for layer in &self.layers {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        x
    }
}

#[derive(Module, Debug)]
pub struct IntraAttention<B: Backend> {
    pub attend: Mlp<B>,
    pub merge:  Linear<B>,
}

impl<B: Backend> IntraAttention<B> {
    /// x: [batch, len, hidden], mask: [batch, len] → [batch, len, hidden]
    pub fn forward(&self, x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 3> {
        let [batch, len, _] = x.dims();
        let f       = self.attend.forward(x.clone());
        let scores  = f.clone().matmul(f.swap_dims(1, 2)); // [b, len, len]
        let weights = softmax(scores + key_bias(mask, batch, len, len), 2);
        let context = weights.matmul(x.clone());
        self.merge.forward(Tensor::cat(vec![x, context], 2))
    }
}

/// Additive bias masking the last axis: [batch, keys] → [batch, queries, keys]
fn key_bias<B: Backend>(mask: Tensor<B, 2>, batch: usize, queries: usize, keys: usize) -> Tensor<B, 3> {
    mask.sub_scalar(1.0)
        .mul_scalar(MASK_PENALTY)
        .unsqueeze_dim::<3>(1)
        .expand([batch, queries, keys])
}

/// Sum over the sequence axis, skipping padding: [b, len, h] → [b, h]
fn masked_sum<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, len, hidden] = x.dims();
    let mask = mask.unsqueeze_dim::<3>(2).expand([batch, len, hidden]);
    (x * mask).sum_dim(1).reshape([batch, hidden])
}

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct AttentionModel<B: Backend> {
    pub embedding:       Embedding<B>,
    pub project:         Linear<B>,
    pub intra:           Option<IntraAttention<B>>,
    pub attend:          Mlp<B>,
    pub compare:         Mlp<B>,
    pub aggregate:       Mlp<B>,
    pub label_embedding: Option<Embedding<B>>,
    pub output:          Linear<B>,
}

pub struct AttentionOutput<B: Backend> {
    /// [batch, num_outputs]
    pub log_probs: Tensor<B, 2>,
    /// Unnormalised alignment scores e: [batch, premise_len, hypothesis_len]
    pub attention: Tensor<B, 3>,
}

impl<B: Backend> AttentionModel<B> {
    /// `labels` is only read by label-conditioned models.
    pub fn forward(&self, batch: &NliBatch<B>, labels: Option<Tensor<B, 1, Int>>) -> AttentionOutput<B> {
        let [n, lp] = batch.premise.dims();
        let [_, lh] = batch.hypothesis.dims();
        let p_mask  = batch.premise_mask.clone();
        let h_mask  = batch.hypothesis_mask.clone();

        let mut a = self.project.forward(self.embedding.forward(batch.premise.clone()));
        let mut b = self.project.forward(self.embedding.forward(batch.hypothesis.clone()));
        if let Some(intra) = &self.intra {
            a = intra.forward(a, p_mask.clone());
            b = intra.forward(b, h_mask.clone());
        }

        // ── Attend ────────────────────────────────────────────────────────────
        let fa = self.attend.forward(a.clone());
        let fb = self.attend.forward(b.clone());
        let e  = fa.matmul(fb.swap_dims(1, 2)); // [n, lp, lh]

        let to_hyp  = softmax(e.clone() + key_bias(h_mask.clone(), n, lp, lh), 2);
        let beta    = to_hyp.matmul(b.clone()); // [n, lp, h]
        let to_prem = softmax(e.clone().swap_dims(1, 2) + key_bias(p_mask.clone(), n, lh, lp), 2);
        let alpha   = to_prem.matmul(a.clone()); // [n, lh, h]

        // ── Compare ───────────────────────────────────────────────────────────
        let v1 = self.compare.forward(Tensor::cat(vec![a, beta], 2));
        let v2 = self.compare.forward(Tensor::cat(vec![b, alpha], 2));

        // ── Aggregate ─────────────────────────────────────────────────────────
        let mut v = Tensor::cat(vec![masked_sum(v1, p_mask), masked_sum(v2, h_mask)], 1);
        if let (Some(embed), Some(labels)) = (&self.label_embedding, labels) {
            let y = embed.forward(labels.reshape([n, 1]));
            let [_, _, d] = y.dims();
            v = Tensor::cat(vec![v, y.reshape([n, d])], 1);
        }

        let logits = self.output.forward(self.aggregate.forward(v));
        AttentionOutput { log_probs: log_softmax(logits, 1), attention: e }
    }
}

/// Pull the first example's unpadded ids and attention out of a batch.
pub fn first_attention_sample<B: Backend>(
    batch:     &NliBatch<B>,
    attention: Tensor<B, 3>,
) -> Result<AttentionSample> {
    let [_, lp] = batch.premise.dims();
    let [_, lh] = batch.hypothesis.dims();

    let unpadded = |ids: Tensor<B, 2, Int>, mask: Tensor<B, 2>, len: usize| -> Result<Vec<u32>> {
        let ids  = int_values(ids.slice([0..1, 0..len]))?;
        let mask = float_values(mask.slice([0..1, 0..len]))?;
        Ok(ids
            .iter()
            .zip(&mask)
            .filter(|(_, m)| **m > 0.5)
            .map(|(&id, _)| id as u32)
            .collect())
    };
    let premise    = unpadded(batch.premise.clone(), batch.premise_mask.clone(), lp)?;
    let hypothesis = unpadded(batch.hypothesis.clone(), batch.hypothesis_mask.clone(), lh)?;

    let scores = float_values(attention.slice([0..1, 0..lp, 0..lh]))?;

    // weights[i][j]: hypothesis word i against premise word j
    let weights = (0..hypothesis.len())
        .map(|i| {
            (0..premise.len())
                .map(|j| scores.get(j * lh + i).copied().unwrap_or(0.0))
                .collect()
        })
        .collect();

    Ok(AttentionSample { premise, hypothesis, weights })
}

// ─── Step implementations ─────────────────────────────────────────────────────
impl<B: AutodiffBackend> TrainStep<B, NliBatch<B>> for AttentionModel<B> {
    fn train_step(&self, batch: NliBatch<B>) -> StepOutput<B> {
        let log_probs = self.forward(&batch, Some(batch.labels.clone())).log_probs;
        classification_step(log_probs, batch.labels)
    }
}

impl<B: Backend> EvalStep<B, NliBatch<B>> for AttentionModel<B> {
    fn eval_step(&self, batch: NliBatch<B>, capture_attention: bool) -> Result<EvalOutput> {
        let out       = self.forward(&batch, Some(batch.labels.clone()));
        let attention = capture_attention
            .then(|| first_attention_sample(&batch, out.attention))
            .transpose()?;
        Ok(EvalOutput { attention, ..classification_eval(out.log_probs, batch.labels) })
    }
}

impl<B: Backend> Classify<B> for AttentionModel<B> {
    fn log_probs(&self, batch: &NliBatch<B>) -> Tensor<B, 2> {
        self.forward(batch, None).log_probs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::NliBatcher, dataset::NliExample};
    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};

    type TestBackend = NdArray;

    fn batch() -> NliBatch<TestBackend> {
        let items = vec![
            NliExample { premise: vec![3, 4, 5], hypothesis: vec![6, 7], label: 0 },
            NliExample { premise: vec![8], hypothesis: vec![9, 3, 4, 5], label: 2 },
        ];
        NliBatcher::<TestBackend>::new(Default::default()).batch(items)
    }

    fn config() -> AttentionConfig {
        AttentionConfig::new(10, 4, 6).with_dropout(0.0)
    }

    #[test]
    fn test_forward_shapes() {
        let model = config().init::<TestBackend>(&Default::default());
        let out   = model.forward(&batch(), None);
        assert_eq!(out.log_probs.dims(), [2, 3]);
        assert_eq!(out.attention.dims(), [2, 3, 4]);
    }

    #[test]
    fn test_intra_attention_and_label_conditioning() {
        let model = config()
            .with_intra_attn(true)
            .with_label_conditioned(true)
            .with_num_outputs(4)
            .init::<TestBackend>(&Default::default());
        let b   = batch();
        let out = model.forward(&b, Some(b.labels.clone()));
        assert_eq!(out.log_probs.dims(), [2, 4]);

        let sums: Vec<f32> = out.log_probs.exp().sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_padding_does_not_change_prediction() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device);
        let single = NliBatcher::<TestBackend>::new(device).batch(vec![
            NliExample { premise: vec![8], hypothesis: vec![9, 3, 4, 5], label: 2 },
        ]);

        let alone: Vec<f32>  = model.forward(&single, None).log_probs.into_data().to_vec().unwrap();
        let padded: Vec<f32> = model
            .forward(&batch(), None)
            .log_probs
            .slice([1..2, 0..3])
            .into_data()
            .to_vec()
            .unwrap();
        for (x, y) in alone.iter().zip(&padded) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }

    #[test]
    fn test_first_attention_sample_strips_padding() {
        let model  = config().init::<TestBackend>(&Default::default());
        let b      = batch();
        let out    = model.eval_step(b, true).unwrap();
        let sample = out.attention.unwrap();
        assert_eq!(sample.premise, vec![3, 4, 5]);
        assert_eq!(sample.hypothesis, vec![6, 7]);
        assert_eq!(sample.weights.len(), 2);
        assert!(sample.weights.iter().all(|row| row.len() == 3));
    }
}
