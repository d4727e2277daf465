// ============================================================
// Layer 5 — Language Models
// ============================================================
// Two next-token models over a [batch, seq_len] window:
//
//   NnlmModel (Bengio et al. 2003)
//     embed → for each position concatenate the embeddings of
//     the current and previous (context - 1) tokens → tanh
//     hidden layer → dropout → vocab projection
//
//   LstmLm
//     embed → single-layer LSTM → dropout → vocab projection
//
// Both return log-probabilities flattened to [batch * seq_len, vocab]
// so they line up with LmBatch::targets.
//
// The NNLM only sees tokens inside the current window. Positions
// before the window start contribute zero vectors.
//
// Reference: Bengio et al. (2003) A Neural Probabilistic Language Model
//            Hochreiter & Schmidhuber (1997) Long Short-Term Memory

use anyhow::Result;
use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
        Lstm, LstmConfig,
    },
    prelude::*,
    tensor::{activation::{log_softmax, tanh}, backend::AutodiffBackend},
};

use crate::data::batcher::LmBatch;
use crate::ml::step::{classification_eval, classification_step, EvalOutput, EvalStep, StepOutput, TrainStep};

// ─── NNLM ─────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct NnlmConfig {
    pub vocab_size:  usize,
    pub embed_dim:   usize,
    pub hidden_size: usize,
    /// Tokens visible at each position, including the current one
    #[config(default = 3)]
    pub context:     usize,
    #[config(default = 0.2)]
    pub dropout:     f64,
}

impl NnlmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NnlmModel<B> {
        let context = self.context.max(1);
        NnlmModel {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            hidden:    LinearConfig::new(self.embed_dim * context, self.hidden_size).init(device),
            output:    LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
            context,
        }
    }
}

#[derive(Module, Debug)]
pub struct NnlmModel<B: Backend> {
    pub embedding: Embedding<B>,
    pub hidden:    Linear<B>,
    pub output:    Linear<B>,
    pub dropout:   Dropout,
    pub context:   usize,
}

impl<B: Backend> NnlmModel<B> {
    /// inputs: [batch, seq_len] → log-probs [batch * seq_len, vocab]
    pub fn forward(&self, inputs: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = inputs.dims();
        let emb    = self.embedding.forward(inputs); // [b, s, d]
        let [_, _, d] = emb.dims();
        let device = emb.device();

        // Feature k at position t is the embedding of token t - k
        let features: Vec<Tensor<B, 3>> = (0..self.context)
            .map(|k| {
                if k == 0 {
                    emb.clone()
                } else if k >= seq_len {
                    Tensor::zeros([batch_size, seq_len, d], &device)
                } else {
                    let shifted = emb.clone().slice([0..batch_size, 0..seq_len - k, 0..d]);
                    let pad     = Tensor::zeros([batch_size, k, d], &device);
                    Tensor::cat(vec![pad, shifted], 1)
                }
            })
            .collect();

        let x      = Tensor::cat(features, 2); // [b, s, d * context]
        let hidden = self.dropout.forward(tanh(self.hidden.forward(x)));
        let logits = self.output.forward(hidden);
        let [_, _, vocab] = logits.dims();
        log_softmax(logits.reshape([batch_size * seq_len, vocab]), 1)
    }
}

// ─── LSTM ─────────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct LstmLmConfig {
    pub vocab_size:  usize,
    pub embed_dim:   usize,
    pub hidden_size: usize,
    #[config(default = 0.2)]
    pub dropout:     f64,
}

impl LstmLmConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmLm<B> {
        LstmLm {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            lstm:      LstmConfig::new(self.embed_dim, self.hidden_size, true).init(device),
            output:    LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct LstmLm<B: Backend> {
    pub embedding: Embedding<B>,
    pub lstm:      Lstm<B>,
    pub output:    Linear<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> LstmLm<B> {
    /// inputs: [batch, seq_len] → log-probs [batch * seq_len, vocab]
    pub fn forward(&self, inputs: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = inputs.dims();
        let emb = self.dropout.forward(self.embedding.forward(inputs));

        // Every window starts from a zero state
        let (hidden, _state) = self.lstm.forward(emb, None); // [b, s, hidden]

        let logits = self.output.forward(self.dropout.forward(hidden));
        let [_, _, vocab] = logits.dims();
        log_softmax(logits.reshape([batch_size * seq_len, vocab]), 1)
    }
}

// ─── Step implementations ─────────────────────────────────────────────────────
impl<B: AutodiffBackend> TrainStep<B, LmBatch<B>> for NnlmModel<B> {
    fn train_step(&self, batch: LmBatch<B>) -> StepOutput<B> {
        classification_step(self.forward(batch.inputs), batch.targets)
    }
}

impl<B: Backend> EvalStep<B, LmBatch<B>> for NnlmModel<B> {
    fn eval_step(&self, batch: LmBatch<B>, _capture_attention: bool) -> Result<EvalOutput> {
        Ok(classification_eval(self.forward(batch.inputs), batch.targets))
    }
}

impl<B: AutodiffBackend> TrainStep<B, LmBatch<B>> for LstmLm<B> {
    fn train_step(&self, batch: LmBatch<B>) -> StepOutput<B> {
        classification_step(self.forward(batch.inputs), batch.targets)
    }
}

impl<B: Backend> EvalStep<B, LmBatch<B>> for LstmLm<B> {
    fn eval_step(&self, batch: LmBatch<B>, _capture_attention: bool) -> Result<EvalOutput> {
        Ok(classification_eval(self.forward(batch.inputs), batch.targets))
    }
}
